pub mod adaptive_step;
pub mod agent;
pub mod attribute;
pub mod config;
pub mod constants;
pub mod correlation;
pub mod criticality;
pub mod error;
pub mod influence;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod normalizer;
pub mod period;
pub mod rng;
pub mod world;

pub use agent::{AgentId, AgentKind, ParameterUpdate};
pub use attribute::{AttributeView, FnAttribute, FnWritableAttribute};
pub use config::{DecisionStrategy, EngineConfig, Schedule};
pub use correlation::{CorrelationMatrix, Sign};
pub use criticality::{CriticalityFunction, CriticalityFunctionParameters};
pub use error::EngineError;
pub use influence::{InfluenceFunction, InfluenceQuery};
pub use message::Direction;
pub use metrics::{CycleSample, RunSummary};
pub use world::{AgentRef, ObjectiveSpec, StepReport, World};
