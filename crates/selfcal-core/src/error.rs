use crate::config::ConfigError;
use crate::criticality::ThresholdError;
use thiserror::Error;

/// Errors raised while registering, wiring or stepping the engine.
///
/// Registration and setup errors are reported before the first cycle runs.
/// An error returned from [`crate::world::World::step`] aborts that cycle; no
/// partial-cycle recovery is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Thresholds(#[from] ThresholdError),
    #[error("attribute `{name}` has an invalid domain [{min}, {max}]")]
    InvalidDomain { name: String, min: f64, max: f64 },
    #[error("an agent named `{0}` is already registered")]
    DuplicateName(String),
    #[error("no attribute agent named `{0}`")]
    UnknownAgent(String),
    #[error("correlation row `{0}` does not belong to a measure agent")]
    NotAMeasure(String),
    #[error("correlation neighbour `{0}` must be a measure or parameter agent")]
    InvalidCorrelationTarget(String),
    #[error("criticality function expects inputs {expected:?} but received {actual:?}")]
    CriticalityInputMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("engine is already set up")]
    AlreadySetUp,
    #[error("engine must be set up before stepping")]
    NotSetUp,
    #[error("sample_every must be positive")]
    InvalidSampleEvery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let config: EngineError = ConfigError::InvalidTickInterval.into();
        assert_eq!(config.to_string(), "tick_interval must be greater than 0");
        let thresholds: EngineError = ThresholdError::NonFinite.into();
        assert_eq!(thresholds.to_string(), "criticality thresholds must be finite");
    }

    #[test]
    fn engine_error_messages() {
        let cases = vec![
            (
                EngineError::DuplicateName("p".into()),
                "an agent named `p` is already registered",
            ),
            (
                EngineError::UnknownAgent("ghost".into()),
                "no attribute agent named `ghost`",
            ),
            (
                EngineError::NotAMeasure("p".into()),
                "correlation row `p` does not belong to a measure agent",
            ),
            (EngineError::NotSetUp, "engine must be set up before stepping"),
        ];
        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
