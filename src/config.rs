//! Configuration types for streaming conversions.
//!
//! Everything a session needs to know about the backend and its own pacing
//! lives in [`ClientConfig`], built via [`ClientConfigBuilder`]. One struct
//! means one place to look when two runs behave differently.

use crate::error::MarkstreamError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base URL of the bundled desktop backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";

/// File name used when saving a converted document without an explicit path.
pub const DEFAULT_OUTPUT_NAME: &str = "converted-document.md";

/// Configuration for a streaming conversion client.
///
/// # Example
/// ```rust
/// use markstream::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("http://localhost:5000")
///     .idle_timeout_secs(Some(60))
///     .render_interval_ms(0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the conversion backend. Default: `http://localhost:3333`.
    pub base_url: String,

    /// Connection setup timeout in seconds. Default: 30.
    pub connect_timeout_secs: u64,

    /// Maximum silence between two transport fragments while streaming.
    /// Default: `Some(120)`.
    ///
    /// Conversions of long documents legitimately take minutes overall, so
    /// this bounds the gap between fragments, never the total duration.
    /// `None` waits forever.
    pub idle_timeout_secs: Option<u64>,

    /// How the live snapshot is paced. Default: throttled at 16 ms.
    pub render_policy: RenderPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 30,
            idle_timeout_secs: Some(120),
            render_policy: RenderPolicy::default(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("render_policy", &self.render_policy)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs.max(1);
        self
    }

    pub fn idle_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.idle_timeout_secs = secs;
        self
    }

    /// `0` renders after every chunk; anything else throttles to that tick.
    pub fn render_interval_ms(mut self, ms: u64) -> Self {
        self.config.render_policy = RenderPolicy::from_interval_ms(ms);
        self
    }

    pub fn render_policy(mut self, policy: RenderPolicy) -> Self {
        self.config.render_policy = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, MarkstreamError> {
        let c = &self.config;
        match reqwest::Url::parse(&c.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(MarkstreamError::InvalidConfig(format!(
                    "Backend URL must be http or https, got '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(MarkstreamError::InvalidConfig(format!(
                    "Backend URL '{}' is invalid: {}",
                    c.base_url, e
                )));
            }
        }
        if c.idle_timeout_secs == Some(0) {
            return Err(MarkstreamError::InvalidConfig(
                "Idle timeout must be ≥ 1s (or disabled)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When the accumulated document is handed to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderPolicy {
    /// Render after every chunk.
    Immediate,
    /// Render at most once per tick of this length.
    Throttled(Duration),
}

impl Default for RenderPolicy {
    fn default() -> Self {
        RenderPolicy::Throttled(Duration::from_millis(16))
    }
}

impl RenderPolicy {
    pub fn from_interval_ms(ms: u64) -> Self {
        if ms == 0 {
            RenderPolicy::Immediate
        } else {
            RenderPolicy::Throttled(Duration::from_millis(ms))
        }
    }

    /// The tick length, or `None` when there is no tick mechanism.
    pub fn tick(&self) -> Option<Duration> {
        match self {
            RenderPolicy::Immediate => None,
            RenderPolicy::Throttled(d) => Some(*d),
        }
    }
}
