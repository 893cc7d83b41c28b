//! Companion chat: keyword safety triage, the hosted text-generation
//! client, and local replies used whenever that service is unreachable.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::capabilities::http::{HttpError, HttpMethod, HttpRequest, HttpTransport, ValidatedUrl};
use crate::config::AssistantConfig;
use crate::error::{AppError, ErrorKind};
use crate::fallback::{first_success, FallbackOutcome};

pub const SAFETY_KEYWORDS: &[&str] = &[
    "scared", "afraid", "frightened", "terrified", "panic", "followed", "stalked", "harassed",
    "threatened", "danger", "unsafe", "help", "emergency", "dangerous", "worried", "anxious",
    "nervous", "uncomfortable", "vulnerable", "alone", "isolated", "trapped", "cornered",
    "attacked",
];

pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "emergency", "urgent", "immediate", "now", "help me", "call police", "call 100", "call 112",
    "dangerous", "attacked", "assaulted", "threatened", "followed",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyIntent {
    pub is_emergency: bool,
    pub is_safety_concern: bool,
    pub confidence: Confidence,
}

/// Single words match whole words only ("now" does not fire on "know");
/// multi-word phrases match as substrings.
#[must_use]
pub fn detect_safety_intent(text: &str) -> SafetyIntent {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let hit = |keyword: &&str| {
        if keyword.contains(' ') {
            lower.contains(*keyword)
        } else {
            words.contains(keyword)
        }
    };

    let is_emergency = EMERGENCY_KEYWORDS.iter().any(hit);
    let has_safety = SAFETY_KEYWORDS.iter().any(hit);
    let confidence = if is_emergency {
        Confidence::High
    } else if has_safety {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    SafetyIntent {
        is_emergency,
        is_safety_concern: is_emergency || has_safety,
        confidence,
    }
}

/// Self-reported mood from the chat screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Anxious,
    Low,
}

const EMERGENCY_REPLY: &str = "I hear that you may be in danger. Please act now:\n\
    - Call 112 (national emergency) or 100 (police)\n\
    - Move to a well-lit public place with people around\n\
    - Call a trusted friend or family member and stay on the line\n\
    - Use the SOS button to alert your emergency contact\n\n\
    Your safety comes first. Reach emergency services right away.";

const SAFETY_REPLY: &str = "It makes sense to feel uneasy. Some steps that can help:\n\
    - Trust your instincts and stay aware of your surroundings\n\
    - Keep your emergency contacts easy to reach\n\
    - Share your live location with someone you trust\n\
    - Plan a safe route and avoid isolated areas\n\n\
    Looking after your safety is the right thing to do.";

const NEUTRAL_REPLY: &str = "I'm having trouble connecting right now, but I'm still here.\n\n\
    If you ever feel unsafe:\n\
    - Call 112 or 100\n\
    - Contact a trusted friend or family member\n\
    - Move to a safe, public place";

const ANXIOUS_NOTE: &str = "\n\nTry slowing your breathing: in for four counts, hold for four, out for four.";

const LOW_NOTE: &str = "\n\nYou don't have to carry this alone. Talking to someone you trust can help.";

/// Deterministic local reply keyed on the triage result and mood.
#[must_use]
pub fn fallback_reply(intent: &SafetyIntent, mood: Mood) -> String {
    if intent.is_emergency {
        return EMERGENCY_REPLY.to_string();
    }
    let base = if intent.is_safety_concern {
        SAFETY_REPLY
    } else {
        NEUTRAL_REPLY
    };
    let note = match mood {
        Mood::Neutral => "",
        Mood::Anxious => ANXIOUS_NOTE,
        Mood::Low => LOW_NOTE,
    };
    format!("{base}{note}")
}

#[must_use]
pub fn system_prompt(intent: &SafetyIntent) -> &'static str {
    if intent.is_emergency {
        "You are Durga, a calm and protective safety companion for women. The user may be in \
         immediate danger. Give short, concrete safety actions first: call 112 or 100, move to a \
         busy public place, contact someone trusted. Be reassuring and direct."
    } else if intent.is_safety_concern {
        "You are Durga, a protective safety companion for women. The user feels unsafe or \
         anxious. Validate their feelings, then give practical preventive advice and point to \
         trusted contacts and emergency numbers when relevant."
    } else {
        "You are Durga, a supportive safety companion for women. Be warm, empathetic and \
         practical. Offer safety awareness when it is relevant, and keep answers conversational."
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub text: String,
    pub is_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    pub is_emergency: bool,
    pub safety_concern: bool,
    pub from_fallback: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssistantError {
    #[error("no assistant endpoints configured")]
    NoEndpoints,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("assistant request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("assistant service returned status {status}")]
    Rejected { status: u16 },

    #[error("assistant response had no text")]
    EmptyResponse,

    #[error("all {attempts} assistant endpoints failed")]
    Exhausted { attempts: usize },
}

impl From<AssistantError> for AppError {
    fn from(e: AssistantError) -> Self {
        match e {
            AssistantError::Http(http) => http.into(),
            AssistantError::Timeout { .. } => AppError::new(ErrorKind::Timeout, e.to_string()),
            AssistantError::Rejected { status } => AppError::from_http_status(status, None),
            _ => AppError::new(ErrorKind::Network, e.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: role.to_string(),
        parts: vec![Part {
            text: text.to_string(),
        }],
    }
}

/// Client for the hosted text-generation API.
pub struct GeminiClient {
    endpoints: Vec<ValidatedUrl>,
    api_key: SecretString,
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    history_limit: usize,
}

impl GeminiClient {
    pub fn new(
        config: &AssistantConfig,
        api_key: SecretString,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, AssistantError> {
        let endpoints = config
            .endpoints
            .iter()
            .map(ValidatedUrl::new)
            .collect::<Result<Vec<_>, _>>()?;
        if endpoints.is_empty() {
            return Err(AssistantError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            api_key,
            transport,
            timeout: Duration::from_millis(config.request_timeout_ms),
            history_limit: config.history_limit,
        })
    }

    /// Tries each endpoint in order and returns the first non-empty text.
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn generate(
        &self,
        message: &str,
        history: &[ChatTurn],
        intent: &SafetyIntent,
    ) -> Result<String, AssistantError> {
        let body = self.request_body(message, history, intent);
        let body = &body;
        let outcome = first_success(self.endpoints.iter(), |endpoint| async move {
            let result = self.call(endpoint, body).await;
            if let Err(e) = &result {
                warn!(host = endpoint.host(), error = %e, "assistant endpoint failed");
            }
            result
        })
        .await;

        match outcome {
            FallbackOutcome::Succeeded { value, .. } => Ok(value),
            FallbackOutcome::Exhausted { failures } => {
                let attempts = failures.len();
                Err(failures
                    .into_iter()
                    .last()
                    .map_or(AssistantError::Exhausted { attempts }, |f| f.error))
            }
        }
    }

    fn request_body(
        &self,
        message: &str,
        history: &[ChatTurn],
        intent: &SafetyIntent,
    ) -> GenerateRequest {
        let skip = history.len().saturating_sub(self.history_limit);
        let mut contents = vec![text_content("model", system_prompt(intent))];
        contents.extend(
            history[skip..]
                .iter()
                .map(|turn| text_content(if turn.is_user { "user" } else { "model" }, &turn.text)),
        );
        contents.push(text_content("user", message));

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 1024,
            },
            safety_settings: HARM_CATEGORIES
                .into_iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }

    async fn call(
        &self,
        endpoint: &ValidatedUrl,
        body: &GenerateRequest,
    ) -> Result<String, AssistantError> {
        let request = HttpRequest::new(HttpMethod::Post, endpoint.clone())
            .with_header("x-goog-api-key", self.api_key.expose_secret().clone())?
            .with_json(body)?
            .with_timeout(self.timeout)?;

        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| AssistantError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        if !response.is_success() {
            return Err(AssistantError::Rejected {
                status: response.status(),
            });
        }

        let parsed: GenerateResponse = response.json()?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(AssistantError::EmptyResponse)
    }
}

/// Chat front door. Always answers: service failures fall back to a
/// local reply.
pub struct Companion {
    client: Option<GeminiClient>,
}

impl Companion {
    #[must_use]
    pub fn new(client: Option<GeminiClient>) -> Self {
        Self { client }
    }

    /// Local replies only.
    #[must_use]
    pub fn offline() -> Self {
        Self { client: None }
    }

    pub async fn reply(&self, message: &str, history: &[ChatTurn], mood: Mood) -> ChatReply {
        let intent = detect_safety_intent(message);
        let generated = match &self.client {
            Some(client) => match client.generate(message, history, &intent).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(error = %e, "assistant unavailable, using local reply");
                    None
                }
            },
            None => None,
        };

        if intent.is_emergency {
            info!("emergency language detected in chat");
        }

        let from_fallback = generated.is_none();
        ChatReply {
            text: generated.unwrap_or_else(|| fallback_reply(&intent, mood)),
            is_emergency: intent.is_emergency,
            safety_concern: intent.is_safety_concern,
            from_fallback,
        }
    }
}
