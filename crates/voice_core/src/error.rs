use thiserror::Error;

/// Why microphone capture could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCause {
    Denied,
    NoDevice,
    Unsupported,
}

impl PermissionCause {
    pub fn user_message(self) -> &'static str {
        match self {
            PermissionCause::Denied => {
                "Microphone access was denied. Allow microphone access to use voice commands."
            }
            PermissionCause::NoDevice => {
                "No microphone was found. Connect a microphone and try again."
            }
            PermissionCause::Unsupported => {
                "Voice input is not supported on this device."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("function '{0}' is not registered")]
    NotFound(String),
    #[error("function '{function}' is missing required parameter '{field}'")]
    Validation { function: String, field: String },
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),
    #[error("conversational api error: {0}")]
    ExternalApi(String),
    #[error("permission denied: {}", .0.user_message())]
    PermissionDenied(PermissionCause),
    #[error("function '{function}' failed: {source}")]
    Handler {
        function: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<reqwest::Error> for VoiceError {
    fn from(value: reqwest::Error) -> Self {
        VoiceError::ExternalApi(value.to_string())
    }
}
