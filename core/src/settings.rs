use plex_config::PlexConfig;
use plex_types::Format;

/// Runtime knobs resolved from [`PlexConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Applied when an envelope has no `connection-timeout`. Negative waits forever.
    pub default_timeout_ms: i64,
    pub default_format: Format,
    pub max_requests: usize,
    pub max_message_bytes: usize,
}

impl Settings {
    pub const DEFAULT_TIMEOUT_MS: i64 = -1;
    pub const DEFAULT_MAX_REQUESTS: usize = 256;
    pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

    #[must_use]
    pub fn from_config(config: Option<&PlexConfig>) -> Self {
        let mut settings = Self::default();
        let Some(config) = config else {
            return settings;
        };
        if let Some(dispatch) = &config.dispatch {
            if let Some(timeout) = dispatch.default_timeout_ms {
                settings.default_timeout_ms = timeout;
            }
            if let Some(format) = dispatch.default_format {
                settings.default_format = format;
            }
        }
        if let Some(limits) = &config.limits {
            if let Some(max) = limits.max_requests {
                settings.max_requests = max;
            }
            if let Some(max) = limits.max_message_bytes {
                settings.max_message_bytes = max;
            }
        }
        settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            default_format: Format::Json,
            max_requests: Self::DEFAULT_MAX_REQUESTS,
            max_message_bytes: Self::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}
