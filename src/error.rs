use std::path::PathBuf;

use thiserror::Error;

use crate::exercise::ExerciseKind;

/// Failures of the audio side. None of these reach the learner: playback
/// degrades to silence instead.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Malformed exercise data, from the remote service or from a caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidExerciseSpec {
    #[error("{kind} exercises need a tolerance")]
    MissingTolerance { kind: ExerciseKind },

    #[error("tolerance must be positive and finite, got {value}")]
    Tolerance { value: f64 },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("correct answer of the {kind} exercise is empty")]
    EmptyAnswer { kind: ExerciseKind },

    #[error("{kind} exercise cannot use a {found} answer")]
    ShapeMismatch {
        kind: ExerciseKind,
        found: &'static str,
    },

    #[error("correct index {index} is outside the {options} options")]
    IndexOutOfRange { index: usize, options: usize },

    #[error("invalid signal: {0}")]
    Signal(String),

    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Errors from an [`ExerciseService`](crate::service::ExerciseService).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidExercise(#[from] InvalidExerciseSpec),

    #[cfg(feature = "remote")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("this action requires a signed-in user")]
    NotAuthenticated,
}

/// Errors surfaced by the exercise runner. The `Display` text is what the
/// learner sees; all of them are dismissible and retryable.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to load exercise. Please try again.")]
    LoadFailed(#[source] ServiceError),

    #[error("Error validating answer. Please try again.")]
    ValidationFailed(#[source] ServiceError),

    #[error("No exercise is loaded.")]
    NoExercise,

    #[error("This exercise has already been answered.")]
    AlreadyAnswered,

    #[error("{0}")]
    IncompleteAnswer(String),

    #[error("Unknown note {0}.")]
    UnknownNote(String),
}

/// Errors loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_errors_read_as_notices() {
        let err = RunnerError::LoadFailed(ServiceError::NotAuthenticated);
        assert_eq!(err.to_string(), "Failed to load exercise. Please try again.");
        assert!(std::error::Error::source(&err).is_some());

        let err = RunnerError::ValidationFailed(ServiceError::Status {
            status: 500,
            message: "boom".into(),
        });
        assert_eq!(err.to_string(), "Error validating answer. Please try again.");
    }

    #[test]
    fn spec_errors_name_the_kind() {
        let err = InvalidExerciseSpec::MissingTolerance {
            kind: ExerciseKind::Panning,
        };
        assert_eq!(err.to_string(), "panning exercises need a tolerance");

        let err = InvalidExerciseSpec::Tolerance { value: 0.0 };
        assert_eq!(err.to_string(), "tolerance must be positive and finite, got 0");
    }
}
