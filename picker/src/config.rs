use crate::selector::CanonicalPhone;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream timeout must be greater than 0")]
    InvalidTimeout,

    #[error("Upstream max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Upstream base URL cannot be used as a base: {0}")]
    InvalidBaseUrl(Url),

    #[error("Support fallback number is not a valid phone: {0}")]
    InvalidSupportNumber(String),
}

/// Network listener configuration
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

/// The contact-list service queried for every request.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Upstream {
    /// Requests go to `{base_url}/agency/{agency}/random-contact`.
    pub base_url: Url,
    /// Budget for a single attempt, body included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_timeout_ms() -> u64 {
    2500
}

fn default_max_attempts() -> u32 {
    2
}

/// Static contact handed out when neither the upstream nor the last-good cache can answer.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SupportFallback {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_support_number")]
    pub number: String,
}

impl Default for SupportFallback {
    fn default() -> Self {
        SupportFallback {
            enabled: true,
            number: default_support_number(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_support_number() -> String {
    "5491169789243".into()
}

fn default_brand_name() -> String {
    "Geraldina".into()
}

fn default_agency() -> i64 {
    17
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Display name returned alongside numbers picked from the upstream.
    #[serde(default = "default_brand_name")]
    pub brand_name: String,
    /// Agency used when the request does not carry one.
    #[serde(default = "default_agency")]
    pub default_agency: i64,
    pub upstream: Upstream,
    #[serde(default)]
    pub support_fallback: SupportFallback,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.upstream.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.upstream.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.upstream.base_url.cannot_be_a_base() {
            return Err(ValidationError::InvalidBaseUrl(
                self.upstream.base_url.clone(),
            ));
        }

        if self.support_fallback.enabled {
            self.support_phone()?;
        }

        Ok(())
    }

    /// The normalized support number, or `None` if the static fallback is disabled.
    pub fn support_phone(&self) -> Result<Option<CanonicalPhone>, ValidationError> {
        if !self.support_fallback.enabled {
            return Ok(None);
        }

        CanonicalPhone::parse(&self.support_fallback.number)
            .map(Some)
            .map_err(|_| ValidationError::InvalidSupportNumber(self.support_fallback.number.clone()))
    }
}
