//! textDescription layer: assemble a per-clip prompt and call a
//! vision-language model through an OpenRouter-like gateway.
//!
//! Parsing is deliberately tolerant: §4.1 requires that a partial or
//! malformed VLM response never fail the whole file, only the one clip,
//! so every field in [`ClipDescription`] is optional and a response body
//! that merely parses as a JSON object (even an empty one) is accepted.

use crate::error::{FindItError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Structured fields extracted from a VLM's free-form JSON reply. Any
/// field the model omitted (or returned `null`) stays `None`/empty rather
/// than failing the call, per the partial-response tolerance rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipDescription {
    pub description: Option<String>,
    pub scene: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    pub mood: Option<String>,
    pub shot_type: Option<String>,
    pub lighting: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Inputs assembled for one clip's VLM prompt: a representative keyframe,
/// the clip's transcript (if the stt layer ran first), and any tags
/// already produced by an earlier run.
pub struct ClipPromptInput<'a> {
    pub keyframe_path: &'a std::path::Path,
    pub transcript: Option<&'a str>,
    pub prior_tags: &'a [String],
}

pub struct VlmClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl VlmClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Build a client against a caller-supplied gateway (§0.2's `[network]`
    /// `gateway_base_url`/`gateway_timeout_secs`) instead of the built-in
    /// OpenRouter endpoint and default (unbounded) reqwest timeout.
    pub fn with_config(
        api_key: Option<String>,
        model: impl Into<String>,
        endpoint: Option<String>,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            client: builder.build().unwrap_or_default(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            model: model.into(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(endpoint: String, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint,
            api_key: Some("test".to_string()),
            model: model.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Build the chat-completion prompt for one clip. Prior tags are
    /// included so the model can refine rather than contradict an earlier
    /// pass; the transcript (if present) grounds dialogue-dependent fields
    /// like `mood`.
    fn build_request(&self, input: &ClipPromptInput) -> Result<ChatRequest<'_>> {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let image_bytes = std::fs::read(input.keyframe_path)
            .map_err(|e| FindItError::FatalPerFile(format!("reading keyframe: {e}")))?;
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(image_bytes));

        let mut prompt = String::from(
            "Describe this video clip. Respond with a JSON object with keys: \
             description, scene, subjects, actions, objects, mood, shot_type, \
             lighting, colors, tags. Omit any field you are unsure of.",
        );
        if let Some(transcript) = input.transcript {
            prompt.push_str(&format!("\nTranscript: {transcript}"));
        }
        if !input.prior_tags.is_empty() {
            prompt.push_str(&format!("\nExisting tags: {}", input.prior_tags.join(", ")));
        }

        Ok(ChatRequest {
            model: &self.model,
            response_format: ResponseFormat { kind: "json_object" },
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
        })
    }

    /// Call the gateway and parse its response into a [`ClipDescription`].
    /// Network failures and non-2xx statuses are transient (the caller
    /// retries via [`crate::network::RetryPolicy`]); a response body that
    /// isn't even a JSON object is the only case treated as permanently
    /// unusable for this clip.
    pub fn describe_clip(&self, input: &ClipPromptInput) -> Result<ClipDescription> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FindItError::Validation("no VLM gateway API key configured".into()))?;

        let body = self.build_request(input)?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()
            .map_err(|e| FindItError::Transient(format!("VLM gateway request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FindItError::Transient(format!(
                "VLM gateway returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| FindItError::Transient(format!("VLM gateway response malformed: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        parse_description(&content)
    }
}

/// Call `client` for one clip's description. Thin free-function wrapper
/// around [`VlmClient::describe_clip`] kept for parity with the other
/// service modules (`probe_media`, `search`), which all expose their
/// entry point as a function rather than requiring callers to know the
/// method name on the client type.
pub fn describe_clip(client: &VlmClient, input: &ClipPromptInput) -> Result<ClipDescription> {
    client.describe_clip(input)
}

/// Parse a VLM's JSON reply into a [`ClipDescription`], treating absent or
/// null fields as empty rather than a parse failure. Only rejects bodies
/// that aren't a JSON object at all.
pub fn parse_description(raw: &str) -> Result<ClipDescription> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| FindItError::FatalPerFile(format!("VLM response is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(FindItError::FatalPerFile(
            "VLM response is not a JSON object".into(),
        ));
    }
    // serde_json::from_value with #[serde(default)] fields tolerates
    // missing keys; nulls deserialize to None/empty via Option/Vec defaults.
    serde_json::from_value(value)
        .map_err(|e| FindItError::FatalPerFile(format!("VLM response fields malformed: {e}")))
}

/// Build the natural-language description text handed to the text
/// embedding provider, joining the structured fields the VLM produced.
pub fn describe_clip_text(description: &ClipDescription) -> String {
    let mut parts = Vec::new();
    if let Some(d) = &description.description {
        parts.push(d.clone());
    }
    if let Some(s) = &description.scene {
        parts.push(s.clone());
    }
    parts.extend(description.subjects.iter().cloned());
    parts.extend(description.actions.iter().cloned());
    parts.extend(description.objects.iter().cloned());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_description_tolerates_missing_fields() {
        let desc = parse_description(r#"{"description":"a dog on a beach"}"#).unwrap();
        assert_eq!(desc.description.as_deref(), Some("a dog on a beach"));
        assert!(desc.subjects.is_empty());
        assert!(desc.mood.is_none());
    }

    #[test]
    fn parse_description_tolerates_null_fields() {
        let desc = parse_description(r#"{"description":null,"subjects":["dog"]}"#).unwrap();
        assert!(desc.description.is_none());
        assert_eq!(desc.subjects, vec!["dog".to_string()]);
    }

    #[test]
    fn parse_description_rejects_non_object() {
        assert!(parse_description("[1,2,3]").is_err());
        assert!(parse_description("not json").is_err());
    }

    #[test]
    fn parse_description_accepts_empty_object() {
        let desc = parse_description("{}").unwrap();
        assert!(desc.description.is_none());
        assert!(desc.tags.is_empty());
    }

    #[test]
    fn describe_clip_without_key_is_validation_error() {
        let client = VlmClient::new(None, "test-model");
        let dir = tempfile::tempdir().unwrap();
        let keyframe = dir.path().join("frame.jpg");
        std::fs::write(&keyframe, b"fake jpeg bytes").unwrap();
        let input = ClipPromptInput {
            keyframe_path: &keyframe,
            transcript: None,
            prior_tags: &[],
        };
        let err = client.describe_clip(&input).unwrap_err();
        assert!(matches!(err, FindItError::Validation(_)));
    }

    #[test]
    fn with_config_overrides_endpoint_and_applies_timeout() {
        let client = VlmClient::with_config(
            Some("key".to_string()),
            "test-model",
            Some("http://127.0.0.1:1/chat".to_string()),
            Some(std::time::Duration::from_millis(50)),
        );
        assert_eq!(client.endpoint, "http://127.0.0.1:1/chat");
        assert!(client.is_available());
    }

    #[test]
    fn describe_clip_against_unreachable_gateway_is_transient() {
        let client = VlmClient::with_endpoint("http://127.0.0.1:1/chat".into(), "test-model");
        let dir = tempfile::tempdir().unwrap();
        let keyframe = dir.path().join("frame.jpg");
        std::fs::write(&keyframe, b"fake jpeg bytes").unwrap();
        let input = ClipPromptInput {
            keyframe_path: &keyframe,
            transcript: Some("hello there"),
            prior_tags: &["beach".to_string()],
        };
        let err = client.describe_clip(&input).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn describe_clip_text_joins_populated_fields() {
        let desc = ClipDescription {
            description: Some("a dog running".to_string()),
            scene: Some("beach".to_string()),
            subjects: vec!["dog".to_string()],
            ..Default::default()
        };
        let text = describe_clip_text(&desc);
        assert!(text.contains("a dog running"));
        assert!(text.contains("beach"));
        assert!(text.contains("dog"));
    }
}
