//! The diary pipeline: resolve, sequence, extract, compose, cross-validate,
//! stitch and refine.
//!
//! Stages run sequentially per request. The only state shared between
//! requests is the throttle behind the generator.

mod cleanup;
mod composer;
mod cross_validate;
mod extractor;
mod prompt;
mod refine;
mod stitch;
mod summary_lines;

pub use cleanup::TextCleaner;
pub use composer::{Draft, NarrativeComposer};
pub use cross_validate::{CrossValidationPlan, CrossValidator, heuristic_score};
pub use extractor::{ObservationExtractor, Observations, parse_observations};
pub use prompt::DraftContext;
pub use refine::Refiner;
pub use stitch::Stitcher;
pub use summary_lines::{
    Categorizer, FALLBACK_SENTENCES, LINE_FIELDS, SummaryWriter, collect_lines, fallback_sentence,
};

use crate::error::SnaplogCoreError;
use crate::generation::ThrottledGenerator;
use crate::media::image_payload;
use crate::throttle::{ThrottleError, ThrottledInvoker, retry_hint};
use crate::timeline::{Timeline, TimestampResolver};
use crate::types::{StageFailure, StageOutcome};
use log::{debug, info, warn};
use snaplog_config::SnaplogConfig;
use snaplog_protocol::{
    CompanionRecord, CrossValidationRecord, DiaryCategory, DiaryOutcome, DiaryRequest,
    DiaryResponse, GenerationPath, GenerationService, LengthBucket, ObservationFrame,
    ObservationGlobal, PipelineStage, RejectReason, RequestId,
};
use std::sync::Arc;
use uuid::Uuid;

/// Message shown when the generation service refuses the content.
pub const REJECTED_MESSAGE: &str =
    "This set of photos can't be turned into a diary entry. Please try different photos.";

/// Runs the per-request state machine.
pub struct DiaryPipeline {
    config: SnaplogConfig,
    generator: ThrottledGenerator,
    resolver: TimestampResolver,
    stitcher: Stitcher,
    categorizer: Categorizer,
    extractor: ObservationExtractor,
    composer: NarrativeComposer,
    cross_validator: CrossValidator,
    refiner: Refiner,
    summary_writer: SummaryWriter,
}

impl DiaryPipeline {
    /// Build a pipeline with its own throttle.
    pub fn new(
        config: SnaplogConfig,
        service: Arc<dyn GenerationService>,
    ) -> Result<Self, SnaplogCoreError> {
        let invoker = Arc::new(ThrottledInvoker::from_config(&config.throttle));
        Self::with_invoker(config, service, invoker)
    }

    /// Build a pipeline sharing an existing throttle.
    pub fn with_invoker(
        config: SnaplogConfig,
        service: Arc<dyn GenerationService>,
        invoker: Arc<ThrottledInvoker>,
    ) -> Result<Self, SnaplogCoreError> {
        config.validate()?;
        let stitcher = Stitcher::new(TextCleaner::new()?)?;
        Ok(Self {
            generator: ThrottledGenerator::new(service, invoker),
            resolver: TimestampResolver::from_config(&config.timeline)?,
            stitcher,
            categorizer: Categorizer::new()?,
            extractor: ObservationExtractor::from_config(&config.generation),
            composer: NarrativeComposer::from_config(&config.generation),
            cross_validator: CrossValidator::from_config(&config),
            refiner: Refiner::from_config(&config),
            summary_writer: SummaryWriter::from_config(&config.generation),
            config,
        })
    }

    pub fn config(&self) -> &SnaplogConfig {
        &self.config
    }

    pub fn invoker(&self) -> &Arc<ThrottledInvoker> {
        self.generator.invoker()
    }

    /// Produce one diary entry for a batch.
    pub async fn compose(&self, request: DiaryRequest) -> Result<DiaryOutcome, SnaplogCoreError> {
        let DiaryRequest {
            mut photos,
            summaries,
            tone,
            target_date,
        } = request;
        let tone = tone
            .map(|tone| tone.trim().to_string())
            .filter(|tone| !tone.is_empty())
            .unwrap_or_else(|| self.config.pipeline.default_tone.clone());
        let mut run = Run::new();
        info!(
            "diary run started (request_id={}, photos={}, summaries={})",
            run.request_id,
            photos.len(),
            summaries.len()
        );

        let max_images = self.config.pipeline.max_images;
        if photos.len() > max_images {
            warn!(
                "batch truncated (request_id={}, received={}, max_images={max_images})",
                run.request_id,
                photos.len()
            );
            photos.truncate(max_images);
        }

        if photos.is_empty() {
            return self.compose_without_photos(run, &summaries, &tone).await;
        }

        run.enter(PipelineStage::Resolving);
        let timeline = Timeline::build(&self.resolver, photos, &summaries, target_date);
        run.enter(PipelineStage::Sequencing);
        // Attachments follow the resolved sequence.
        let images = timeline
            .photos
            .iter()
            .map(|sequenced| image_payload(&sequenced.photo))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "timeline built (request_id={}, dates={:?}, breaks={})",
            run.request_id,
            timeline.date_sequence,
            timeline.day_breaks.len()
        );

        run.enter(PipelineStage::Extracting);
        let observations = match self
            .extractor
            .extract(&self.generator, images, self.stitcher.cleaner())
            .await
        {
            StageOutcome::Ok(observations) => observations,
            StageOutcome::Rejected(reason) => {
                run.enter(PipelineStage::Rejected);
                info!(
                    "diary run rejected (request_id={}, reason={reason})",
                    run.request_id
                );
                return Ok(DiaryOutcome::Rejected {
                    request_id: run.request_id,
                    reason: RejectReason::UnsafeContent,
                    message: REJECTED_MESSAGE.to_string(),
                });
            }
            StageOutcome::Failed(StageFailure::Service(err)) => {
                return self.extraction_failed(run, &timeline, err);
            }
            StageOutcome::Failed(StageFailure::Unparseable(reason)) => {
                debug!(
                    "observations unusable, trying summary lines (request_id={}, reason={reason})",
                    run.request_id
                );
                return self.compose_from_lines(run, &timeline, &summaries, &tone).await;
            }
        };

        Ok(DiaryOutcome::Completed(
            self.narrate(run, timeline, observations, &tone).await,
        ))
    }

    /// Compose, cross-validate, stitch and refine. Every failure here
    /// degrades locally.
    async fn narrate(
        &self,
        mut run: Run,
        timeline: Timeline,
        observations: Observations,
        tone: &str,
    ) -> DiaryResponse {
        let Observations { frames, global } = observations;
        let frame_count = frames.len();
        let category = self.categorizer.for_frames(&frames);
        let length = LengthBucket::for_count(frame_count);
        let ctx = DraftContext {
            frames: &frames,
            global,
            day_breaks: &timeline.day_breaks,
            tone,
            length,
        };

        run.enter(PipelineStage::Composing);
        let cleaner = self.stitcher.cleaner();
        let primary_model = self.cross_validator.primary_model();
        let (selected, cross_validation) = match self
            .composer
            .draft(&self.generator, &ctx, primary_model, cleaner)
            .await
        {
            Ok(primary) => match self.cross_validator.plan(&frames) {
                CrossValidationPlan::Skip(record) => (Some(primary), Some(record)),
                CrossValidationPlan::Run {
                    alternate_model,
                    score,
                } => {
                    run.enter(PipelineStage::CrossValidating);
                    let alternate = self
                        .composer
                        .draft(&self.generator, &ctx, &alternate_model, cleaner)
                        .await;
                    let (draft, record) =
                        self.cross_validator
                            .select(primary, alternate, &alternate_model, score);
                    (Some(draft), Some(record))
                }
            },
            Err(failure) => {
                warn!(
                    "primary draft failed, using frame template (request_id={}, failure={failure:?})",
                    run.request_id
                );
                (None, None)
            }
        };

        run.enter(PipelineStage::Stitching);
        let stitched = selected.and_then(|draft| {
            self.stitcher
                .stitch(&draft.text, frame_count, &timeline.day_breaks)
                .map(|body| (draft.text, body))
        });
        let (tagged, mut body, path) = match stitched {
            Some((tagged, body)) => (tagged, body, GenerationPath::VisionPipeline),
            None => {
                debug!(
                    "using frame template (request_id={}, frames={frame_count})",
                    run.request_id
                );
                (
                    self.stitcher.fallback_tagged(&frames),
                    self.stitcher
                        .compose_fallback(&frames, &timeline.day_breaks),
                    GenerationPath::FrameTemplate,
                )
            }
        };

        let mut refined = false;
        if self.refiner.should_refine(&body) {
            run.enter(PipelineStage::Refining);
            match self
                .refiner
                .refine(&self.generator, &tagged, tone, length)
                .await
            {
                Ok(output) => {
                    run.enter(PipelineStage::Stitching);
                    match self
                        .stitcher
                        .stitch(&output, frame_count, &timeline.day_breaks)
                    {
                        Some(text) => {
                            body = text;
                            refined = true;
                        }
                        None => warn!(
                            "refined text could not be stitched, keeping draft (request_id={})",
                            run.request_id
                        ),
                    }
                }
                Err(failure) => warn!(
                    "refine failed, keeping draft (request_id={}, failure={failure:?})",
                    run.request_id
                ),
            }
        }
        let body = cleaner.soften(&body);

        run.enter(PipelineStage::Done);
        info!(
            "diary run finished (request_id={}, path={path:?}, category={category}, refined={refined})",
            run.request_id
        );
        run.response(ResponseParts {
            body,
            category,
            length,
            path,
            timeline: Some(&timeline),
            observations: frames,
            global: Some(global),
            cross_validation,
            refined,
        })
    }

    async fn compose_without_photos(
        &self,
        mut run: Run,
        summaries: &[CompanionRecord],
        tone: &str,
    ) -> Result<DiaryOutcome, SnaplogCoreError> {
        let lines = collect_lines(summaries, self.stitcher.cleaner());
        if lines.is_empty() {
            warn!("diary run has no input (request_id={})", run.request_id);
            return Err(SnaplogCoreError::EmptyBatch);
        }
        run.enter(PipelineStage::Composing);
        self.write_lines(run, None, &lines, tone).await
    }

    async fn compose_from_lines(
        &self,
        mut run: Run,
        timeline: &Timeline,
        summaries: &[CompanionRecord],
        tone: &str,
    ) -> Result<DiaryOutcome, SnaplogCoreError> {
        let lines = collect_lines(summaries, self.stitcher.cleaner());
        if lines.is_empty() {
            run.enter(PipelineStage::Failed);
            return Ok(run.fallback(timeline.len(), Some(timeline)));
        }
        run.enter(PipelineStage::Composing);
        self.write_lines(run, Some(timeline), &lines, tone).await
    }

    async fn write_lines(
        &self,
        mut run: Run,
        timeline: Option<&Timeline>,
        lines: &[String],
        tone: &str,
    ) -> Result<DiaryOutcome, SnaplogCoreError> {
        let fallback_count = timeline.map_or(lines.len(), Timeline::len);
        match self
            .summary_writer
            .write(&self.generator, lines, tone, self.stitcher.cleaner())
            .await
        {
            Ok(body) => {
                run.enter(PipelineStage::Done);
                Ok(DiaryOutcome::Completed(run.response(ResponseParts {
                    body,
                    category: self.categorizer.for_lines(lines),
                    length: LengthBucket::for_count(lines.len()),
                    path: GenerationPath::SummaryLines,
                    timeline,
                    observations: Vec::new(),
                    global: None,
                    cross_validation: None,
                    refined: false,
                })))
            }
            Err(StageFailure::Service(err)) if err.is_rate_limit_exhaustion() => {
                run.enter(PipelineStage::Failed);
                Err(rate_limited(&err))
            }
            Err(failure) => {
                warn!(
                    "summary-lines path failed (request_id={}, failure={failure:?})",
                    run.request_id
                );
                run.enter(PipelineStage::Failed);
                Ok(run.fallback(fallback_count, timeline))
            }
        }
    }

    fn extraction_failed(
        &self,
        mut run: Run,
        timeline: &Timeline,
        err: ThrottleError,
    ) -> Result<DiaryOutcome, SnaplogCoreError> {
        run.enter(PipelineStage::Failed);
        if err.is_rate_limit_exhaustion() {
            warn!(
                "diary run rate limited (request_id={}, err={err})",
                run.request_id
            );
            return Err(rate_limited(&err));
        }
        warn!(
            "diary run fell back (request_id={}, err={err})",
            run.request_id
        );
        Ok(run.fallback(timeline.len(), Some(timeline)))
    }
}

fn rate_limited(err: &ThrottleError) -> SnaplogCoreError {
    let last = err.generation_error();
    SnaplogCoreError::RateLimited {
        message: last.to_string(),
        retry_after: retry_hint(last),
    }
}

struct ResponseParts<'a> {
    body: String,
    category: DiaryCategory,
    length: LengthBucket,
    path: GenerationPath,
    timeline: Option<&'a Timeline>,
    observations: Vec<ObservationFrame>,
    global: Option<ObservationGlobal>,
    cross_validation: Option<CrossValidationRecord>,
    refined: bool,
}

/// Per-request bookkeeping.
struct Run {
    request_id: RequestId,
    stages: Vec<PipelineStage>,
}

impl Run {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(
            "stage entered (request_id={}, stage={stage:?})",
            self.request_id
        );
        self.stages.push(stage);
    }

    fn response(self, parts: ResponseParts<'_>) -> DiaryResponse {
        let (date_sequence, day_breaks, ordering) = match parts.timeline {
            Some(timeline) => (
                timeline.date_sequence.clone(),
                timeline.day_breaks.clone(),
                timeline.ordering.clone(),
            ),
            None => Default::default(),
        };
        DiaryResponse {
            request_id: self.request_id,
            body: parts.body,
            category: parts.category,
            length: parts.length,
            path: parts.path,
            observations: parts.observations,
            global: parts.global,
            date_sequence,
            day_breaks,
            ordering,
            cross_validation: parts.cross_validation,
            refined: parts.refined,
            stages: self.stages,
        }
    }

    /// Fixed fallback sentence; the category follows the batch size.
    fn fallback(self, count: usize, timeline: Option<&Timeline>) -> DiaryOutcome {
        let category = if count > 1 {
            DiaryCategory::JourneyMulti
        } else {
            DiaryCategory::GeneralSingle
        };
        DiaryOutcome::Completed(self.response(ResponseParts {
            body: fallback_sentence().to_string(),
            category,
            length: LengthBucket::for_count(count),
            path: GenerationPath::Fallback,
            timeline,
            observations: Vec::new(),
            global: None,
            cross_validation: None,
            refined: false,
        }))
    }
}
