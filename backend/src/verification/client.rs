use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use shared::ClassLabel;
use thiserror::Error;
use url::Url;

use crate::config::VerificationConfig;
use crate::sample::{ImageSample, MediaType};

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Verification service returned {code}: {body}")]
    Status { code: u16, body: String },
    #[error("Verification service returned an empty reply")]
    EmptyReply,
    #[error("Verification is enabled but VERIFICATION_API_KEY is not set")]
    MissingApiKey,
    #[error("Invalid verification endpoint: {0}")]
    UrlError(#[from] url::ParseError),
}

/// Decoded reply of the external verification service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The service judged the image not to be a chest radiograph.
    Rejected,
    Narrative(String),
}

/// Strips whitespace, quoting and closing punctuation a model may wrap a bare token in.
fn bare_token(reply: &str) -> &str {
    reply
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '*' | '.' | '!'))
}

impl VerificationOutcome {
    pub fn from_reply(reply: &str, sentinel: &str) -> Result<Self, VerificationError> {
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(VerificationError::EmptyReply);
        }
        if bare_token(reply) == sentinel {
            Ok(VerificationOutcome::Rejected)
        } else {
            Ok(VerificationOutcome::Narrative(reply.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
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
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn prompt(label: ClassLabel, sentinel: &str) -> String {
    format!(
        "You are a radiology triage system.\n\
         FIRST: check whether the attached image is a real chest radiograph.\n\
         - If it is NOT a chest radiograph (a person, an object, a landscape or anything else), \
         reply ONLY with the word {sentinel} and nothing else.\n\
         - If it IS a radiograph, act as a radiologist. The local classifier detected {label}. \
         Explain the findings in 4 technical lines."
    )
}

fn data_url(sample: &ImageSample) -> String {
    let mime = sample
        .declared_media_type()
        .unwrap_or(MediaType::Jpeg)
        .mime();
    format!("data:{};base64,{}", mime, BASE64.encode(sample.bytes()))
}

#[derive(Clone)]
pub struct VerificationClient {
    http_client: HttpClient,
    endpoint: Url,
    api_key: String,
    model: String,
    max_tokens: u32,
    sentinel: String,
}

impl VerificationClient {
    pub fn from_config(config: &VerificationConfig) -> Result<Self, VerificationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(VerificationError::MissingApiKey)?;
        let http_client = HttpClient::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http_client,
            endpoint: Url::parse(&config.endpoint)?,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            sentinel: config.rejection_sentinel.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_body(&self, sample: &ImageSample, label: ClassLabel) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt(label, &self.sentinel),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(sample),
                        },
                    },
                ],
            }],
        }
    }

    fn decode(&self, response: ChatResponse) -> Result<VerificationOutcome, VerificationError> {
        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(VerificationError::EmptyReply)?;
        VerificationOutcome::from_reply(&reply, &self.sentinel)
    }

    /// One round trip per image. Timeouts surface as `HttpError`.
    pub async fn verify(
        &self,
        sample: &ImageSample,
        label: ClassLabel,
    ) -> Result<VerificationOutcome, VerificationError> {
        log::debug!("Verifying {} ({})", sample.file_name(), label);

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(sample, label))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerificationError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let outcome = self.decode(response.json::<ChatResponse>().await?)?;
        if outcome == VerificationOutcome::Rejected {
            log::warn!("{} was rejected as not a chest radiograph", sample.file_name());
        }
        Ok(outcome)
    }
}
