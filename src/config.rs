//! Session configuration

use std::time::Duration;

const DEFAULT_API_BASE: &str = "http://localhost:8080";
const DEFAULT_MAX_AUTO_ADVANCE: u32 = 32;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for one chat surface
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_base: String,
    /// Initial session token; a soft login may replace it at runtime
    pub token: Option<String>,
    pub course_id: String,
    pub preview_mode: bool,
    /// Automatic turns allowed per user action
    pub max_auto_advance: u32,
    /// Timeout for non-streaming requests (transcript, tree, feedback)
    pub request_timeout: Duration,
}

impl SessionConfig {
    pub fn new(course_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            course_id: course_id.into(),
            preview_mode: false,
            max_auto_advance: DEFAULT_MAX_AUTO_ADVANCE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("TUTOR_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            token: std::env::var("TUTOR_TOKEN").ok().filter(|t| !t.is_empty()),
            course_id: std::env::var("TUTOR_COURSE_ID").unwrap_or_default(),
            preview_mode: std::env::var("TUTOR_PREVIEW")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            max_auto_advance: std::env::var("TUTOR_MAX_AUTO_ADVANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_AUTO_ADVANCE),
            request_timeout: std::env::var("TUTOR_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(
                    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                    Duration::from_secs,
                ),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_preview_mode(mut self, preview_mode: bool) -> Self {
        self.preview_mode = preview_mode;
        self
    }

    #[must_use]
    pub fn with_max_auto_advance(mut self, max_auto_advance: u32) -> Self {
        self.max_auto_advance = max_auto_advance;
        self
    }

    /// Join a path onto the API base without doubling slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
