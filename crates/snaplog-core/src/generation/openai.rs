//! OpenAI-compatible chat-completions provider.

use crate::error::SnaplogCoreError;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::{Value, json};
use snaplog_config::GenerationConfig;
use snaplog_protocol::{
    GenerationError, GenerationReply, GenerationRequest, GenerationService, ResponseFormat,
};
use std::time::Duration;

/// Client for any endpoint speaking the `/chat/completions` protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SnaplogCoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SnaplogCoreError::Generation(GenerationError::Provider(err.to_string())))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from config, reading the API key from the configured variable.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, SnaplogCoreError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "api key variable is unset (name={})",
                config.api_key_env
            );
        }
        Self::new(config.base_url.clone(), api_key, config.timeout())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl GenerationService for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationReply, GenerationError> {
        let body = request_body(&request);
        debug!(
            "posting chat completion (model={}, purpose={}, images={})",
            request.model,
            request.purpose.as_str(),
            request.images.len()
        );
        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(error_from_response(status, &headers, &text));
        }
        reply_from_body(&request.model, &text)
    }
}

/// JSON body for one request.
pub(crate) fn request_body(request: &GenerationRequest) -> Value {
    let user_content = if request.images.is_empty() {
        Value::String(request.prompt.clone())
    } else {
        let mut parts = vec![json!({ "type": "text", "text": request.prompt })];
        parts.extend(request.images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": { "url": image.url, "detail": "high" }
            })
        }));
        Value::Array(parts)
    };
    let mut body = json!({
        "model": request.model,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": user_content }
        ]
    });
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    if request.response_format == ResponseFormat::JsonObject {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

pub(crate) fn reply_from_body(model: &str, text: &str) -> Result<GenerationReply, GenerationError> {
    let body: CompletionBody = serde_json::from_str(text)
        .map_err(|err| GenerationError::InvalidResponse(format!("malformed body: {err}")))?;
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in reply".to_string()))?;
    if let Some(refusal) = choice.message.refusal.filter(|value| !value.trim().is_empty()) {
        return Err(GenerationError::ContentPolicy(refusal));
    }
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GenerationError::ContentPolicy(
            "reply stopped by content filter".to_string(),
        ));
    }
    let content = choice
        .message
        .content
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| GenerationError::InvalidResponse("empty content".to_string()))?;
    Ok(GenerationReply {
        model: body.model.unwrap_or_else(|| model.to_string()),
        content,
    })
}

pub(crate) fn error_from_response(
    status: StatusCode,
    headers: &HeaderMap,
    text: &str,
) -> GenerationError {
    let error = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| value.get("error").cloned())
        .unwrap_or(Value::Null);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("http {status}: {}", text.trim()));
    let code = error.get("code").and_then(Value::as_str).unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = error
            .get("retry_after")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .or_else(|| header_retry_after(headers));
        return GenerationError::RateLimited {
            message,
            retry_after,
        };
    }
    if code == "content_policy_violation" || code == "content_filter" {
        return GenerationError::ContentPolicy(message);
    }
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            GenerationError::Timeout(message)
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
            GenerationError::Connection(message)
        }
        _ => GenerationError::Provider(message),
    }
}

fn header_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(millis) = headers
        .get("retry-after-ms")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
    {
        return Some(Duration::from_millis(millis.max(0.0).round() as u64));
    }
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .map(|seconds| Duration::from_millis((seconds.max(0.0) * 1000.0).round() as u64))
}

fn transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        GenerationError::Connection(err.to_string())
    } else {
        GenerationError::Provider(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderValue;
    use snaplog_protocol::{GenerationPurpose, ImagePayload};

    fn request(images: Vec<ImagePayload>, format: ResponseFormat) -> GenerationRequest {
        GenerationRequest {
            purpose: GenerationPurpose::Observation,
            model: "vision-model".to_string(),
            system: "observer".to_string(),
            prompt: "describe".to_string(),
            images,
            temperature: 0.0,
            top_p: None,
            max_tokens: 700,
            response_format: format,
        }
    }

    #[test]
    fn vision_requests_attach_images_and_json_format() {
        let body = request_body(&request(
            vec![ImagePayload {
                url: "data:image/png;base64,AAAA".to_string(),
            }],
            ResponseFormat::JsonObject,
        ));
        assert_eq!(body["response_format"], json!({ "type": "json_object" }));
        assert_eq!(body["messages"][1]["content"][0]["text"], "describe");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn text_requests_send_plain_content() {
        let mut text = request(Vec::new(), ResponseFormat::Text);
        text.top_p = Some(0.8);
        let body = request_body(&text);
        assert_eq!(body["messages"][1]["content"], "describe");
        assert!(body.get("response_format").is_none());
        assert!(body.get("top_p").is_some());
    }

    #[test]
    fn rate_limit_reads_body_then_headers() {
        let body = r#"{"error":{"message":"Rate limit reached","retry_after":1200}}"#;
        let err = error_from_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), body);
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1200)));

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        let err = error_from_response(StatusCode::TOO_MANY_REQUESTS, &headers, "{}");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        assert!(err.is_retryable());
    }

    #[test]
    fn policy_and_server_errors_are_classified() {
        let body = r#"{"error":{"message":"blocked","code":"content_policy_violation"}}"#;
        assert_eq!(
            error_from_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), body),
            GenerationError::ContentPolicy("blocked".to_string())
        );
        assert!(matches!(
            error_from_response(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new(), ""),
            GenerationError::Connection(_)
        ));
        assert!(matches!(
            error_from_response(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "{}"),
            GenerationError::Provider(_)
        ));
    }

    #[test]
    fn refusals_and_empty_replies_are_errors() {
        let refusal = r#"{"choices":[{"message":{"content":null,"refusal":"cannot help"}}]}"#;
        assert!(matches!(
            reply_from_body("m", refusal),
            Err(GenerationError::ContentPolicy(_))
        ));
        let empty = r#"{"choices":[{"message":{"content":"  "}}]}"#;
        assert!(matches!(
            reply_from_body("m", empty),
            Err(GenerationError::InvalidResponse(_))
        ));
        let ok = r#"{"model":"served","choices":[{"message":{"content":" hi "}}]}"#;
        assert_eq!(
            reply_from_body("m", ok).expect("reply"),
            GenerationReply {
                model: "served".to_string(),
                content: "hi".to_string()
            }
        );
    }
}
