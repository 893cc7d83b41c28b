use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::audio::AudioFileReader;
use crate::capabilities::http::{
    HttpError, HttpMethod, HttpRequest, HttpTransport, MultipartFile, NetworkPolicy, ValidatedUrl,
};
use crate::config::RelayConfig;
use crate::error::{AppError, ErrorKind};

pub const SOS_PATH: &str = "/alerts/sos";
pub const SOS_AUDIO_PATH: &str = "/alerts/sos-audio";
pub const AUDIO_FIELD: &str = "audio";
pub const AUDIO_FILE_NAME: &str = "sos_audio.m4a";
pub const AUDIO_MIME_TYPE: &str = "audio/m4a";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("relay did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("relay rejected the request: {0}")]
    Rejected(AppError),

    #[error("could not read audio '{uri}': {message}")]
    AudioUnreadable { uri: String, message: String },
}

impl From<RelayError> for AppError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Http(http) => http.into(),
            RelayError::Timeout { .. } => AppError::new(ErrorKind::Timeout, e.to_string()),
            RelayError::Rejected(err) => err,
            RelayError::AudioUnreadable { .. } => AppError::new(ErrorKind::Recorder, e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SosAlertRequest {
    pub phone: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SosAlertResponse {
    #[serde(default)]
    pub message: Option<String>,
    /// Provider message id; absent when the relay has no telephony provider.
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUploadResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub audio_url: String,
    #[serde(default)]
    pub code: Option<String>,
}

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContactEntry {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

/// `{message, user|data, token?, code}`
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "data")]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub token: Option<SecretString>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "user")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Client for the backend relay that forwards SOS messages to a
/// telephony provider, plus the account endpoints the UI consumes.
pub struct RelayClient {
    base_url: String,
    policy: NetworkPolicy,
    timeout: Duration,
    transport: Arc<dyn HttpTransport>,
    files: Arc<dyn AudioFileReader>,
    token: RwLock<Option<SecretString>>,
}

impl RelayClient {
    pub fn new(
        config: &RelayConfig,
        transport: Arc<dyn HttpTransport>,
        files: Arc<dyn AudioFileReader>,
    ) -> Result<Self, HttpError> {
        let policy = if config.allow_private_network {
            NetworkPolicy::AllowPrivate
        } else {
            NetworkPolicy::PublicOnly
        };
        let base_url = config.base_url.trim_end_matches('/').to_string();
        ValidatedUrl::with_policy(base_url.as_str(), policy)?;

        Ok(Self {
            base_url,
            policy,
            timeout: config.request_timeout(),
            transport,
            files,
            token: RwLock::new(None),
        })
    }

    pub fn set_token(&self, token: Option<SecretString>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// POST the composed alert. A 2xx answer means the relay accepted it.
    #[instrument(skip(self, alert), fields(has_location = alert.lat.is_some(), has_audio = alert.audio_url.is_some()))]
    pub async fn send_sos(&self, alert: &SosAlertRequest) -> Result<SosAlertResponse, RelayError> {
        let request = self.request(HttpMethod::Post, SOS_PATH)?.with_json(alert)?;
        let response: SosAlertResponse = self.execute(request).await?;
        info!(code = ?response.code, has_sid = response.sid.is_some(), "relay accepted SOS");
        Ok(response)
    }

    /// Uploads a finished recording and returns its public URL.
    #[instrument(skip(self, uri))]
    pub async fn upload_sos_audio(&self, uri: &str) -> Result<AudioUploadResponse, RelayError> {
        let data = self
            .files
            .read(uri)
            .await
            .map_err(|e| RelayError::AudioUnreadable {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
        debug!(bytes = data.len(), "uploading SOS audio");

        let request = self
            .request(HttpMethod::Post, SOS_AUDIO_PATH)?
            .with_multipart(MultipartFile {
                field: AUDIO_FIELD.to_string(),
                file_name: AUDIO_FILE_NAME.to_string(),
                mime_type: AUDIO_MIME_TYPE.to_string(),
                data,
            })?;
        self.execute(request).await
    }

    #[instrument(skip(self, credentials))]
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, RelayError> {
        let request = self
            .request(HttpMethod::Post, "/auth/login")?
            .with_json(credentials)?;
        self.execute(request).await
    }

    #[instrument(skip(self, registration))]
    pub async fn register(&self, registration: &RegisterRequest) -> Result<AuthResponse, RelayError> {
        let request = self
            .request(HttpMethod::Post, "/users/register")?
            .with_json(registration)?;
        self.execute(request).await
    }

    pub async fn profile(&self) -> Result<DataResponse, RelayError> {
        let request = self.request(HttpMethod::Get, "/users/profile")?;
        self.execute(request).await
    }

    pub async fn verify_token(&self) -> Result<DataResponse, RelayError> {
        let request = self.request(HttpMethod::Get, "/auth/verify-token")?;
        self.execute(request).await
    }

    pub async fn emergency_contacts(&self) -> Result<DataResponse, RelayError> {
        let request = self.request(HttpMethod::Get, "/users/emergency-contacts")?;
        self.execute(request).await
    }

    pub async fn add_emergency_contact(
        &self,
        contact: &EmergencyContactEntry,
    ) -> Result<DataResponse, RelayError> {
        let request = self
            .request(HttpMethod::Post, "/users/emergency-contacts")?
            .with_json(contact)?;
        self.execute(request).await
    }

    /// Tells the relay to drop the session and forgets the local token even
    /// when the call fails.
    pub async fn logout(&self) -> Result<(), RelayError> {
        let result = match self.request(HttpMethod::Post, "/auth/logout") {
            Ok(request) => self.execute::<DataResponse>(request).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        self.set_token(None);
        result
    }

    fn request(&self, method: HttpMethod, path: &str) -> Result<HttpRequest, HttpError> {
        let url = ValidatedUrl::with_policy(format!("{}{}", self.base_url, path), self.policy)?;
        let mut request = HttpRequest::new(method, url).with_timeout(self.timeout)?;

        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = token.as_ref() {
            request = request.with_header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            )?;
        }
        Ok(request)
    }

    async fn execute<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, RelayError> {
        let request_id = request.request_id().to_string();
        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| RelayError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        if !response.is_success() {
            let err = AppError::from_http_status(response.status(), Some(response.body()));
            warn!(%request_id, status = response.status(), code = err.code(), "relay error");
            return Err(RelayError::Rejected(err));
        }

        Ok(response.json()?)
    }
}
