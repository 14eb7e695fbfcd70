use crate::agent::AgentKind;
use crate::constants::{
    HISTORY_CAPACITY, MAX_PROPAGATION_ROUNDS, MAX_STEP_RATIO, MIN_STEP_RATIO,
    REQUEST_INITIAL_STEP,
};
use crate::normalizer::NormalizerKind;
use serde::{Deserialize, Serialize};

/// Order in which agents perceive and act within one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Every agent perceives in creation order, then every agent acts.
    CreationOrder,
    /// Each kind perceives and acts completely before the next kind starts.
    Grouped { order: Vec<AgentKind> },
}

impl Default for Schedule {
    fn default() -> Self {
        Self::Grouped {
            order: AgentKind::CONTROL.to_vec(),
        }
    }
}

/// How a parameter turns the selected objective into a direction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionStrategy {
    /// Direction from the sign of the influence estimate only.
    #[default]
    Influence,
    /// Influence direction, overridden by the K nearest past situations when
    /// their recorded outcome was an improvement.
    CaseMemory {
        k: usize,
        /// First-stage candidates kept by measure distance, as a multiple of `k`.
        candidate_factor: usize,
        /// Absolute distance under which a stored situation counts as identical.
        exact_match_threshold: f64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deterministic seed for tie-breaks and case selection.
    pub seed: u64,
    pub schedule: Schedule,
    /// External ticks per engine cycle when driven through `tick()`.
    pub tick_interval: u32,
    /// Initial criticality-path step, as a fraction of the parameter range.
    pub initial_step_ratio: f64,
    pub min_step_ratio: f64,
    pub max_step_ratio: f64,
    /// Initial request-path step, in parameter units.
    pub request_initial_step: f64,
    pub request_min_step_ratio: f64,
    pub request_max_step_ratio: f64,
    /// Weight of the previous coefficient in the learned influence update.
    pub influence_smoothing: f64,
    /// Influence coefficients below this magnitude snap to zero.
    pub influence_epsilon: f64,
    /// Coefficient assumed for an objective before anything was learned.
    pub initial_influence: f64,
    /// Criticality values each objective keeps for period detection.
    pub history_capacity: usize,
    pub period_tolerance: f64,
    pub normalizer: NormalizerKind,
    /// Upper bound on measure forwarding rounds per cycle.
    pub max_propagation_rounds: usize,
    pub decision: DecisionStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            schedule: Schedule::default(),
            tick_interval: 1,
            initial_step_ratio: 1e-4,
            min_step_ratio: MIN_STEP_RATIO,
            max_step_ratio: MAX_STEP_RATIO,
            request_initial_step: REQUEST_INITIAL_STEP,
            request_min_step_ratio: MIN_STEP_RATIO,
            request_max_step_ratio: 1.0,
            influence_smoothing: 0.8,
            influence_epsilon: 1e-3,
            initial_influence: 1.0,
            history_capacity: HISTORY_CAPACITY,
            period_tolerance: 1e-9,
            normalizer: NormalizerKind::default(),
            max_propagation_rounds: MAX_PROPAGATION_ROUNDS,
            decision: DecisionStrategy::default(),
        }
    }
}

macro_rules! define_config_error {
    (
        $(
            $variant:ident $( { $($field:ident : $type:ty),* } )? => $fmt:literal $(, $arg:expr)*
        );* $(;)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum ConfigError {
            $(
                $variant $( { $($field : $type),* } )?,
            )*
        }

        impl std::fmt::Display for ConfigError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant $( { $($field),* } )? => write!(f, $fmt $(, $arg)*),
                    )*
                }
            }
        }
    };
}

define_config_error! {
    InvalidTickInterval => "tick_interval must be greater than 0";
    InvalidStepRatios => "min_step_ratio/max_step_ratio must be finite, positive, and ordered";
    InvalidInitialStepRatio => "initial_step_ratio must be finite and positive";
    InvalidRequestStep => "request_initial_step must be finite and positive";
    InvalidRequestStepRatios => "request_min_step_ratio/request_max_step_ratio must be finite, positive, and ordered";
    InvalidInfluenceSmoothing => "influence_smoothing must be finite and within [0,1]";
    InvalidInfluenceEpsilon => "influence_epsilon must be finite and within [0,1)";
    InvalidInitialInfluence => "initial_influence must be finite and within [-1,1]";
    InvalidHistoryCapacity { min: usize, actual: usize } => "history_capacity ({actual}) must be at least {min}";
    InvalidPeriodTolerance => "period_tolerance must be finite and non-negative";
    InvalidNormalizerWindow => "sliding window normalizer needs a window of at least 1";
    InvalidMaxPropagationRounds => "max_propagation_rounds must be greater than 0";
    InvalidNeighbourCount => "case memory k and candidate_factor must be greater than 0";
    InvalidExactMatchThreshold => "exact_match_threshold must be finite and non-negative";
    IncompleteSchedule { kind: AgentKind } => "grouped schedule must list {kind} agents exactly once";
    UnschedulableKind { kind: AgentKind } => "grouped schedule cannot list {kind} agents";
    ParameterScheduledTooEarly => "grouped schedule must run parameter agents after measure, satisfaction, and objective agents";
}

impl std::error::Error for ConfigError {}

fn positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl EngineConfig {
    /// Smallest history that still allows a period of 2.
    pub const MIN_HISTORY_CAPACITY: usize = 4;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        self.validate_steps()?;
        self.validate_influence()?;
        self.validate_objectives()?;
        self.validate_propagation()?;
        self.validate_decision()?;
        self.validate_schedule()?;
        Ok(())
    }

    fn validate_steps(&self) -> Result<(), ConfigError> {
        if !(positive_finite(self.min_step_ratio)
            && positive_finite(self.max_step_ratio)
            && self.min_step_ratio <= self.max_step_ratio)
        {
            return Err(ConfigError::InvalidStepRatios);
        }
        if !positive_finite(self.initial_step_ratio) {
            return Err(ConfigError::InvalidInitialStepRatio);
        }
        if !positive_finite(self.request_initial_step) {
            return Err(ConfigError::InvalidRequestStep);
        }
        if !(positive_finite(self.request_min_step_ratio)
            && positive_finite(self.request_max_step_ratio)
            && self.request_min_step_ratio <= self.request_max_step_ratio)
        {
            return Err(ConfigError::InvalidRequestStepRatios);
        }
        Ok(())
    }

    fn validate_influence(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.influence_smoothing) {
            return Err(ConfigError::InvalidInfluenceSmoothing);
        }
        if !(0.0..1.0).contains(&self.influence_epsilon) {
            return Err(ConfigError::InvalidInfluenceEpsilon);
        }
        if !(-1.0..=1.0).contains(&self.initial_influence) {
            return Err(ConfigError::InvalidInitialInfluence);
        }
        Ok(())
    }

    fn validate_objectives(&self) -> Result<(), ConfigError> {
        if self.history_capacity < Self::MIN_HISTORY_CAPACITY {
            return Err(ConfigError::InvalidHistoryCapacity {
                min: Self::MIN_HISTORY_CAPACITY,
                actual: self.history_capacity,
            });
        }
        if !(self.period_tolerance.is_finite() && self.period_tolerance >= 0.0) {
            return Err(ConfigError::InvalidPeriodTolerance);
        }
        if let NormalizerKind::SlidingWindowMaxAbs { window: 0 } = self.normalizer {
            return Err(ConfigError::InvalidNormalizerWindow);
        }
        Ok(())
    }

    fn validate_propagation(&self) -> Result<(), ConfigError> {
        if self.max_propagation_rounds == 0 {
            return Err(ConfigError::InvalidMaxPropagationRounds);
        }
        Ok(())
    }

    fn validate_decision(&self) -> Result<(), ConfigError> {
        if let DecisionStrategy::CaseMemory {
            k,
            candidate_factor,
            exact_match_threshold,
        } = self.decision
        {
            if k == 0 || candidate_factor == 0 {
                return Err(ConfigError::InvalidNeighbourCount);
            }
            if !(exact_match_threshold.is_finite() && exact_match_threshold >= 0.0) {
                return Err(ConfigError::InvalidExactMatchThreshold);
            }
        }
        Ok(())
    }

    fn validate_schedule(&self) -> Result<(), ConfigError> {
        let Schedule::Grouped { order } = &self.schedule else {
            return Ok(());
        };
        if let Some(&kind) = order.iter().find(|k| !AgentKind::CONTROL.contains(k)) {
            return Err(ConfigError::UnschedulableKind { kind });
        }
        for kind in AgentKind::CONTROL {
            if order.iter().filter(|&&k| k == kind).count() != 1 {
                return Err(ConfigError::IncompleteSchedule { kind });
            }
        }
        let position = |kind: AgentKind| order.iter().position(|&k| k == kind);
        let parameter = position(AgentKind::Parameter);
        let too_early = [
            AgentKind::Measure,
            AgentKind::Satisfaction,
            AgentKind::Objective,
        ]
        .into_iter()
        .any(|kind| position(kind) > parameter);
        if too_early {
            return Err(ConfigError::ParameterScheduledTooEarly);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(EngineConfig {
            schedule: Schedule::CreationOrder,
            ..EngineConfig::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn partial_json_deserializes_with_defaults() {
        let json = r#"{
            "seed": 7,
            "schedule": { "kind": "creation_order" },
            "decision": { "kind": "case_memory", "k": 3, "candidate_factor": 2, "exact_match_threshold": 1e-6 }
        }"#;
        let config: EngineConfig = serde_json::from_str(json).expect("config should parse");
        assert_eq!(config.seed, 7);
        assert_eq!(config.schedule, Schedule::CreationOrder);
        assert_eq!(config.history_capacity, HISTORY_CAPACITY);
        assert!(matches!(
            config.decision,
            DecisionStrategy::CaseMemory { k: 3, .. }
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_steps() {
        let config = EngineConfig {
            min_step_ratio: 1e-2,
            max_step_ratio: 1e-3,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidStepRatios));

        let config = EngineConfig {
            request_initial_step: f64::NAN,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRequestStep));
    }

    #[test]
    fn validate_rejects_short_history() {
        let config = EngineConfig {
            history_capacity: 3,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidHistoryCapacity { min: 4, actual: 3 })
        );
    }

    #[test]
    fn validate_rejects_bad_schedules() {
        let grouped = |order: Vec<AgentKind>| EngineConfig {
            schedule: Schedule::Grouped { order },
            ..EngineConfig::default()
        };
        use AgentKind::*;
        assert_eq!(
            grouped(vec![Measure, Output, Parameter, Satisfaction, Objective]).validate(),
            Err(ConfigError::ParameterScheduledTooEarly)
        );
        assert_eq!(
            grouped(vec![Measure, Output, Objective, Parameter]).validate(),
            Err(ConfigError::IncompleteSchedule { kind: Satisfaction })
        );
        assert_eq!(
            grouped(vec![Measure, Measure, Output, Satisfaction, Objective, Parameter]).validate(),
            Err(ConfigError::IncompleteSchedule { kind: Measure })
        );
        assert_eq!(
            grouped(vec![Situation, Measure, Output, Satisfaction, Objective, Parameter]).validate(),
            Err(ConfigError::UnschedulableKind { kind: Situation })
        );
        assert!(grouped(vec![Output, Objective, Measure, Satisfaction, Parameter])
            .validate()
            .is_ok());
    }

    #[test]
    fn validate_rejects_bad_case_memory() {
        let config = EngineConfig {
            decision: DecisionStrategy::CaseMemory {
                k: 0,
                candidate_factor: 2,
                exact_match_threshold: 0.0,
            },
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidNeighbourCount));
    }

    #[test]
    fn error_display_messages_are_preserved() {
        let cases = vec![
            (
                ConfigError::InvalidTickInterval,
                "tick_interval must be greater than 0",
            ),
            (
                ConfigError::InvalidHistoryCapacity { min: 4, actual: 2 },
                "history_capacity (2) must be at least 4",
            ),
            (
                ConfigError::IncompleteSchedule {
                    kind: AgentKind::Objective,
                },
                "grouped schedule must list objective agents exactly once",
            ),
            (
                ConfigError::UnschedulableKind {
                    kind: AgentKind::Situation,
                },
                "grouped schedule cannot list situation agents",
            ),
            (
                ConfigError::InvalidNormalizerWindow,
                "sliding window normalizer needs a window of at least 1",
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
