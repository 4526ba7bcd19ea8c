use async_trait::async_trait;
use parking_lot::Mutex;
use snaplog_protocol::{
    GenerationError, GenerationPurpose, GenerationReply, GenerationRequest, GenerationService,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

/// One request seen by a mock generator.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: GenerationRequest,
    pub at: Instant,
}

type Scripted = Result<String, GenerationError>;

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<GenerationPurpose, VecDeque<Scripted>>,
    defaults: HashMap<GenerationPurpose, Scripted>,
    calls: Vec<RecordedCall>,
}

/// Replies from per-purpose queues, then per-purpose defaults, and records
/// every request with its start instant.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, purpose: GenerationPurpose, content: impl Into<String>) -> Self {
        self.push(purpose, Ok(content.into()))
    }

    pub fn then_err(self, purpose: GenerationPurpose, err: GenerationError) -> Self {
        self.push(purpose, Err(err))
    }

    pub fn push(self, purpose: GenerationPurpose, reply: Result<String, GenerationError>) -> Self {
        self.script
            .lock()
            .queued
            .entry(purpose)
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used once the queue for `purpose` is empty.
    pub fn with_default(
        self,
        purpose: GenerationPurpose,
        reply: Result<String, GenerationError>,
    ) -> Self {
        self.script.lock().defaults.insert(purpose, reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().calls.clone()
    }

    pub fn calls_for(&self, purpose: GenerationPurpose) -> Vec<RecordedCall> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|call| call.request.purpose == purpose)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationReply, GenerationError> {
        let mut script = self.script.lock();
        let purpose = request.purpose;
        let model = request.model.clone();
        script.calls.push(RecordedCall {
            request,
            at: Instant::now(),
        });
        let queued = script
            .queued
            .get_mut(&purpose)
            .and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(reply) => reply,
            None => script.defaults.get(&purpose).cloned().unwrap_or_else(|| {
                Err(GenerationError::Provider(format!(
                    "no scripted reply for {}",
                    purpose.as_str()
                )))
            }),
        };
        reply.map(|content| GenerationReply { model, content })
    }
}

/// Fails every request with the same error and counts attempts.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    error: GenerationError,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl FailingGenerator {
    pub fn new(error: GenerationError) -> Self {
        Self {
            error,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl GenerationService for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationReply, GenerationError> {
        self.attempts.lock().push(Instant::now());
        Err(self.error.clone())
    }
}
