use std::env;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use verity_contracts::analysis::{AnalysisError, AnalysisPrompt, RawReport};
use verity_contracts::image::EncodedImage;

pub mod ingest;
pub mod session;

/// Every payload is re-tagged with this MIME type for transmission,
/// independent of the upload's declared type.
pub const TRANSMISSION_MIME_TYPE: &str = "image/jpeg";

pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

/// The seam between the session pipeline and the inference capability.
/// Backends and test doubles implement this.
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(
        &self,
        image: &EncodedImage,
        prompt: &AnalysisPrompt,
    ) -> Result<RawReport, AnalysisError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout_s: f64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_ANALYSIS_MODEL.to_string(),
            api_key: api_key.into(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }

    /// Reads the conventional environment variables; `None` without a key.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))?;
        let mut config = Self::new(api_key);
        if let Some(api_base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env("VERITY_ANALYSIS_MODEL") {
            config.model = model;
        }
        Some(config)
    }
}

/// Client for the Gemini `generateContent` endpoint. One request per
/// `analyze` call, no internal retry; retry policy belongs to the caller.
pub struct GeminiAnalysisClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiAnalysisClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path
        )
    }

    fn build_request_payload(payload_base64: &str, prompt: &AnalysisPrompt) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt.as_str() },
                    {
                        "inlineData": {
                            "mimeType": TRANSMISSION_MIME_TYPE,
                            "data": payload_base64,
                        }
                    },
                ],
            }],
        })
    }
}

impl AnalysisProvider for GeminiAnalysisClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn analyze(
        &self,
        image: &EncodedImage,
        prompt: &AnalysisPrompt,
    ) -> Result<RawReport, AnalysisError> {
        let Some(payload) = image.payload_base64() else {
            return Err(AnalysisError::MalformedImageData);
        };

        let endpoint = self.endpoint();
        let body = Self::build_request_payload(payload, prompt);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(Duration::from_secs_f64(self.config.request_timeout_s))
            .json(&body)
            .send()
            .map_err(|err| AnalysisError::transport(err.to_string()))?;

        let response_payload = response_json_or_error("Gemini", response)?;
        if let Some(reason) = block_reason(&response_payload) {
            return Err(AnalysisError::service(format!(
                "analysis blocked by the service ({reason})"
            )));
        }
        let text = extract_report_text(&response_payload);
        RawReport::new(text).ok_or_else(|| AnalysisError::service("no analysis generated"))
    }
}

fn response_json_or_error(
    provider: &str,
    response: HttpResponse,
) -> Result<Value, AnalysisError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| AnalysisError::transport(format!("{provider} response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(AnalysisError::service(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body)
        .map_err(|_| AnalysisError::service(format!("{provider} returned invalid JSON payload")))
}

fn extract_report_text(response_payload: &Value) -> String {
    let candidates = response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = String::new();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(Value::as_object)
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            let text = part.get("text").and_then(Value::as_str).unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text);
        }
    }

    out
}

fn block_reason(response_payload: &Value) -> Option<String> {
    response_payload
        .get("promptFeedback")
        .or_else(|| response_payload.get("prompt_feedback"))
        .and_then(Value::as_object)
        .and_then(|feedback| {
            feedback
                .get("blockReason")
                .or_else(|| feedback.get("block_reason"))
        })
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_data_url(data_url: &str) -> EncodedImage {
        EncodedImage {
            mime_type: "image/png".to_string(),
            byte_len: 4,
            sha256: "00".repeat(32),
            width: 1,
            height: 1,
            data_url: data_url.to_string(),
        }
    }

    fn unreachable_client() -> GeminiAnalysisClient {
        let mut config = GeminiConfig::new("test-key");
        config.api_base = "http://127.0.0.1:9".to_string();
        config.request_timeout_s = 1.0;
        GeminiAnalysisClient::new(config)
    }

    #[test]
    fn endpoint_prefixes_bare_model_names() {
        let client = GeminiAnalysisClient::new(GeminiConfig::new("k"));
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn endpoint_keeps_explicit_model_paths_and_trims_base_slashes() {
        let mut config = GeminiConfig::new("k");
        config.api_base = "https://example.test/v1beta/".to_string();
        config.model = "models/gemini-2.0-pro".to_string();
        let client = GeminiAnalysisClient::new(config);
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-pro:generateContent"
        );
    }

    #[test]
    fn request_payload_retags_to_the_transmission_mime_type() {
        let prompt = AnalysisPrompt::custom("is this real?");
        let payload = GeminiAnalysisClient::build_request_payload("QUJD", &prompt);
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "is this real?");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "QUJD");
    }

    #[test]
    fn malformed_payload_fails_before_any_dispatch() {
        let client = unreachable_client();
        let image = image_with_data_url("data:image/png;notbase64");
        let err = client
            .analyze(&image, &AnalysisPrompt::default())
            .err()
            .expect("must fail");
        // A dispatch against the unreachable base would surface as Transport.
        assert_eq!(err, AnalysisError::MalformedImageData);
    }

    #[test]
    fn dispatch_failures_are_transport_errors() {
        let client = unreachable_client();
        let image = image_with_data_url("data:image/png;base64,QUJD");
        let err = client
            .analyze(&image, &AnalysisPrompt::default())
            .err()
            .expect("must fail");
        assert!(err.is_transport(), "got {err:?}");
    }

    #[test]
    fn report_text_concatenates_all_text_parts() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "## Heading" },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                        { "text": "Body line" },
                    ],
                }
            }],
        });
        assert_eq!(extract_report_text(&payload), "## Heading\nBody line");
    }

    #[test]
    fn report_text_is_empty_for_textless_payloads() {
        assert_eq!(extract_report_text(&json!({})), "");
        assert_eq!(
            extract_report_text(&json!({ "candidates": [{ "content": { "parts": [] } }] })),
            ""
        );
    }

    #[test]
    fn block_reason_reads_both_key_spellings() {
        let camel = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let snake = json!({ "prompt_feedback": { "block_reason": "SAFETY" } });
        assert_eq!(block_reason(&camel).as_deref(), Some("SAFETY"));
        assert_eq!(block_reason(&snake).as_deref(), Some("SAFETY"));
        assert_eq!(block_reason(&json!({})), None);
    }

    #[test]
    fn truncate_text_appends_ellipsis_past_the_limit() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghij", 4), "abcd…");
    }
}
