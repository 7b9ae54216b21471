//! Chat-completions client for the external recognizer.
//!
//! One client serves both tasks: image understanding with the vision model
//! and duration suggestion with the text model in JSON-object mode.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use bestby_core::{CanonicalName, DurationString};

use super::parse::{parse_duration_map, parse_item_list};
use super::{DurationSource, Recognizer, RecognizerError};
use crate::config::OpenAiConfig;

const IMAGE_MAX_TOKENS: u32 = 300;
const DURATION_MAX_TOKENS: u32 = 1000;

const IMAGE_PROMPT: &str = "\
You are given a photo of groceries. List the common name of every distinct \
grocery item visible in the photo. Answer with a JSON array of strings only, \
for example [\"Apple\", \"Grape\", \"Yogurt\"]. Answer [] if there are none.";

const DURATION_PROMPT: &str = "\
For each grocery item in the list below, estimate how long it typically keeps \
before expiring. Express each estimate as '<NUMBER> <UNIT>' where UNIT is one \
of D (days), W (weeks), M (months) or Y (years), using a single unit per item. \
Answer with one JSON object mapping every item name exactly as given to its \
duration string, for example {\"Apple\": \"1 W\", \"Grape\": \"4 D\", \"Egg\": \"1 M\"}.";

/// Client for the chat-completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    inner: Arc<OpenAiClientInner>,
}

struct OpenAiClientInner {
    client: reqwest::Client,
    completions_url: Url,
    vision_model: String,
    text_model: String,
}

impl OpenAiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`RecognizerError::Setup`] if the API key is not a valid
    /// header value, the base URL cannot be extended, or the HTTP client
    /// cannot be built.
    pub fn new(config: &OpenAiConfig) -> Result<Self, RecognizerError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
            .map_err(|_| RecognizerError::Setup("API key is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RecognizerError::Setup(e.to_string()))?;

        let completions_url = completions_url(&config.base_url)?;

        Ok(Self {
            inner: Arc::new(OpenAiClientInner {
                client,
                completions_url,
                vision_model: config.vision_model.clone(),
                text_model: config.text_model.clone(),
            }),
        })
    }

    /// Send a chat request and return the first choice's text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, RecognizerError> {
        let response = self
            .inner
            .client
            .post(self.inner.completions_url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RecognizerError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RecognizerError::InvalidResponse("No content in response".to_string()))
    }
}

#[async_trait]
impl Recognizer for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.inner.vision_model, image_bytes = image.len()))]
    async fn recognize_image(&self, image: &[u8]) -> Result<Vec<String>, RecognizerError> {
        let data_url = format!(
            "data:{};base64,{}",
            sniff_image_mime(image),
            STANDARD.encode(image)
        );

        let request = ChatRequest {
            model: self.inner.vision_model.clone(),
            max_tokens: IMAGE_MAX_TOKENS,
            messages: vec![ChatMessage::user(vec![
                ContentPart::Text {
                    text: IMAGE_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: "low",
                    },
                },
            ])],
            response_format: None,
        };

        let content = self.complete(&request).await?;
        let items = parse_item_list(&content).inspect_err(|e| {
            warn!(error = %e, "Unparseable image recognition answer");
        })?;

        debug!(count = items.len(), "Image recognized");
        Ok(items)
    }
}

#[async_trait]
impl DurationSource for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.inner.text_model, names = names.len()))]
    async fn suggest_durations(
        &self,
        names: &[CanonicalName],
    ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        let list = serde_json::to_string(names)
            .map_err(|e| RecognizerError::Setup(format!("cannot encode item names: {e}")))?;

        let request = ChatRequest {
            model: self.inner.text_model.clone(),
            max_tokens: DURATION_MAX_TOKENS,
            messages: vec![ChatMessage::user(vec![ContentPart::Text {
                text: format!("{DURATION_PROMPT}\n\nItems: {list}"),
            }])],
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let content = self.complete(&request).await?;
        let durations = parse_duration_map(&content).inspect_err(|e| {
            warn!(error = %e, "Unparseable duration answer");
        })?;

        debug!(suggested = durations.len(), "Durations suggested");
        Ok(durations)
    }
}

/// Map an error status to a typed error.
async fn handle_error_status(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> RecognizerError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return RecognizerError::RateLimited(retry_after);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return RecognizerError::Unauthorized("Invalid API key".to_string());
    }

    match response.text().await {
        Ok(body) => {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |api_error| api_error.error.message);
            RecognizerError::Api {
                status: status.as_u16(),
                message,
            }
        }
        Err(e) => RecognizerError::Http(e),
    }
}

/// Append `chat/completions` to the configured base URL.
fn completions_url(base: &Url) -> Result<Url, RecognizerError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RecognizerError::Setup(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(["chat", "completions"]);
    Ok(url)
}

/// Best-effort MIME type from the image's magic bytes.
fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

impl ChatMessage {
    const fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use axum::{Router, body::Body, http::StatusCode, response::Response, routing::post};
    use secrecy::SecretString;

    use super::*;

    /// Serve one canned chat-completions answer and return the base URL.
    async fn stub(
        status: u16,
        headers: &'static [(&'static str, &'static str)],
        body: impl Into<String>,
    ) -> Url {
        let body: String = body.into();
        let answer = move || {
            let body = body.clone();
            async move {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = StatusCode::from_u16(status).unwrap();
                for (name, value) in headers {
                    response
                        .headers_mut()
                        .insert(*name, HeaderValue::from_static(*value));
                }
                response
            }
        };
        let app = Router::new().route("/v1/chat/completions", post(answer));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Url::parse(&format!("http://{addr}/v1")).unwrap()
    }

    fn client(base_url: Url) -> OpenAiClient {
        OpenAiClient::new(&OpenAiConfig {
            api_key: SecretString::from("sk-test-7Hq2mZ9xLw4Rv8Kp".to_string()),
            base_url,
            vision_model: "vision".to_string(),
            text_model: "text".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn answer(content: &str) -> String {
        serde_json::json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
            .to_string()
    }

    fn names(raw: &[&str]) -> Vec<CanonicalName> {
        raw.iter().map(|n| CanonicalName::parse(n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_image_list_is_extracted_from_prose() {
        let body = answer("Sure! [\"Apple\", \"Milk\"]");
        let items = client(stub(200, &[], body).await)
            .recognize_image(b"\xff\xd8")
            .await
            .unwrap();
        assert_eq!(items, vec!["Apple", "Milk"]);
    }

    #[tokio::test]
    async fn test_prose_answer_is_parse_failure() {
        let body = answer("I can see some apples.");
        let err = client(stub(200, &[], body).await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::ResponseParse(_)));
        assert!(err.is_parse_failure());
    }

    #[tokio::test]
    async fn test_duration_answer_must_be_an_object() {
        let prose = answer("Apples keep about a week.");
        let err = client(stub(200, &[], prose).await)
            .suggest_durations(&names(&["Apple"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::ResponseParse(_)));

        let object = answer(r#"{"Apple": "1 W", "Kale": "soon"}"#);
        let durations = client(stub(200, &[], object).await)
            .suggest_durations(&names(&["Apple", "Kale"]))
            .await
            .unwrap();
        assert_eq!(durations.len(), 1);
        assert_eq!(
            durations[&CanonicalName::parse("Apple").unwrap()],
            DurationString::parse("1 W").unwrap()
        );
    }

    #[tokio::test]
    async fn test_server_error_is_api_error_with_message() {
        let body = r#"{"error": {"message": "The server is overloaded", "type": "server_error"}}"#;
        let err = client(stub(500, &[], body).await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        match err {
            RecognizerError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "The server is overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_is_kept_verbatim() {
        let err = client(stub(502, &[], "Bad Gateway").await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecognizerError::Api { status: 502, ref message } if message == "Bad Gateway"
        ));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let err = client(stub(401, &[], "{}").await)
            .suggest_durations(&names(&["Apple"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::Unauthorized(_)));
        assert!(!err.is_parse_failure());
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let err = client(stub(429, &[("retry-after", "17")], "{}").await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::RateLimited(17)));

        let err = client(stub(429, &[], "{}").await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::RateLimited(60)));
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_invalid_response() {
        let not_json = client(stub(200, &[], "<html>oops</html>").await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(not_json, RecognizerError::InvalidResponse(_)));
        assert!(!not_json.is_parse_failure());

        let no_content = client(stub(200, &[], r#"{"choices": []}"#).await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(no_content, RecognizerError::InvalidResponse(_)));

        let null_content = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let err = client(stub(200, &[], null_content).await)
            .recognize_image(b"img")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognizerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_closed_port_is_http_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}/v1")).unwrap();
        let err = client(base).recognize_image(b"img").await.unwrap_err();
        assert!(matches!(err, RecognizerError::Http(_)));
        assert!(!err.is_parse_failure());
    }

    #[test]
    fn test_completions_url() {
        let base = Url::parse("https://api.openai.com/v1").unwrap();
        assert_eq!(
            completions_url(&base).unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );

        let trailing = Url::parse("http://127.0.0.1:8080/v1/").unwrap();
        assert_eq!(
            completions_url(&trailing).unwrap().as_str(),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_sniff_image_mime() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0d]), "image/png");
        assert_eq!(sniff_image_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8"), "image/webp");
        assert_eq!(sniff_image_mime(&[0xff, 0xd8, 0xff]), "image/jpeg");
        assert_eq!(sniff_image_mime(&[]), "image/jpeg");
    }

    #[test]
    fn test_image_request_wire_shape() {
        let request = ChatRequest {
            model: "vision".to_string(),
            max_tokens: IMAGE_MAX_TOKENS,
            messages: vec![ChatMessage::user(vec![
                ContentPart::Text {
                    text: "hi".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/jpeg;base64,AA==".to_string(),
                        detail: "low",
                    },
                },
            ])],
            response_format: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["detail"], "low");
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"[\"Apple\"]"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("[\"Apple\"]")
        );
    }
}
