use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::capabilities::kv::{KeyNamespace, KeyValueStore, KvError, KvKey, TypedKvStore};
use crate::error::{AppError, ErrorKind};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const LANGUAGE_KEY: &str = "selected_language";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Mr,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Hi, Language::Mr];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Mr => "mr",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Small device-local preferences: the relay session token and the UI
/// language.
#[derive(Clone)]
pub struct LocalSettings {
    token: TypedKvStore<String>,
    language: TypedKvStore<String>,
}

impl LocalSettings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self, KvError> {
        Ok(Self {
            token: TypedKvStore::new(
                Arc::clone(&store),
                KvKey::new(KeyNamespace::Session, AUTH_TOKEN_KEY)?,
            ),
            language: TypedKvStore::new(store, KvKey::new(KeyNamespace::Settings, LANGUAGE_KEY)?),
        })
    }

    pub async fn auth_token(&self) -> Result<Option<SecretString>, KvError> {
        Ok(self.token.load().await?.map(SecretString::new))
    }

    pub async fn set_auth_token(&self, token: &SecretString) -> Result<(), KvError> {
        self.token.save(&token.expose_secret().clone()).await
    }

    pub async fn clear_auth_token(&self) -> Result<(), KvError> {
        let removed = self.token.clear().await?;
        debug!(removed, "auth token cleared");
        Ok(())
    }

    /// Stored language, or English when unset or unrecognized.
    pub async fn language(&self) -> Result<Language, KvError> {
        let Some(code) = self.language.load().await? else {
            return Ok(Language::default());
        };
        Ok(Language::from_code(&code).unwrap_or_else(|| {
            warn!(code = %code, "unsupported stored language, using default");
            Language::default()
        }))
    }

    pub async fn set_language_code(&self, code: &str) -> Result<Language, AppError> {
        let language = Language::from_code(code).ok_or_else(|| {
            AppError::new(ErrorKind::Validation, format!("unsupported language '{code}'"))
        })?;
        self.set_language(language).await?;
        Ok(language)
    }

    pub async fn set_language(&self, language: Language) -> Result<(), KvError> {
        self.language.save(&language.code().to_string()).await
    }
}
