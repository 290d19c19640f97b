//! Voice session and bridge configuration.

use std::time::Duration;

/// Configuration for [`VoiceSessionController`](crate::VoiceSessionController)
/// and the realtime service it talks to.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// How long error events stay suppressed after teardown starts.
    pub teardown_grace: Duration,
    /// Realtime API base URL, without a trailing slash.
    pub realtime_base_url: String,
    pub model: String,
    pub voice: String,
    /// System instructions given to the speech agent.
    pub instructions: String,
    pub request_timeout: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            teardown_grace: Duration::from_millis(Self::DEFAULT_TEARDOWN_GRACE_MS),
            realtime_base_url: Self::DEFAULT_REALTIME_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            voice: Self::DEFAULT_VOICE.to_string(),
            instructions: Self::DEFAULT_INSTRUCTIONS.to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl VoiceConfig {
    pub const DEFAULT_TEARDOWN_GRACE_MS: u64 = 1000;
    pub const DEFAULT_REALTIME_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-realtime-preview";
    pub const DEFAULT_VOICE: &'static str = "alloy";
    pub const DEFAULT_INSTRUCTIONS: &'static str = "You are a calendar assistant. Use the calendar tools to \
        look up, create, change and delete events. Confirm destructive changes before making them. \
        Call end_session when the user is done.";

    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }

    pub fn with_realtime_base_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Configuration for [`SessionEventBridge`](crate::SessionEventBridge).
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Delay between the end-session bookkeeping and the termination signal,
    /// so the agent can finish speaking its goodbye.
    pub end_signal_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            end_signal_delay: Duration::from_millis(1500),
        }
    }
}

impl BridgeConfig {
    pub fn new(end_signal_delay: Duration) -> Self {
        Self { end_signal_delay }
    }
}
