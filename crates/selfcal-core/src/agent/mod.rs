//! Agent roles and the per-cycle context they act in.
//!
//! Agents never touch each other directly. Everything they learn about the
//! rest of the system arrives through their mailbox or through the attribute
//! registry, and everything they want others to know goes into the
//! [`Outbox`], which the engine delivers between agents.

mod measure;
mod objective;
mod parameter;
mod satisfaction;
mod situation;

pub use measure::{MeasureAgent, Neighbour, OutputAgent};
pub use objective::ObjectiveAgent;
pub use parameter::{ParameterAgent, ParameterUpdate};
pub use satisfaction::SatisfactionAgent;
pub use situation::SituationAgent;

use crate::attribute::AttributeRegistry;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::influence::InfluenceFunction;
use crate::memory::CaseMemory;
use crate::message::{Mailbox, Message};
use crate::world::StepReport;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Measure,
    Output,
    Satisfaction,
    Objective,
    Parameter,
    Situation,
}

impl AgentKind {
    /// Kinds that take part in the perceive / decide-and-act schedule, in
    /// creation order.
    pub const CONTROL: [AgentKind; 5] = [
        AgentKind::Measure,
        AgentKind::Output,
        AgentKind::Satisfaction,
        AgentKind::Objective,
        AgentKind::Parameter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Measure => "measure",
            Self::Output => "output",
            Self::Satisfaction => "satisfaction",
            Self::Objective => "objective",
            Self::Parameter => "parameter",
            Self::Situation => "situation",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense per-kind index, assigned in registration order and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId {
    pub kind: AgentKind,
    pub index: u32,
}

impl AgentId {
    pub fn new(kind: AgentKind, index: usize) -> Self {
        Self {
            kind,
            index: index as u32,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.index)
    }
}

/// Messages produced during one agent's turn, waiting for delivery.
#[derive(Debug, Default)]
pub struct Outbox {
    envelopes: Vec<(AgentId, Message)>,
}

impl Outbox {
    pub fn send(&mut self, to: AgentId, message: Message) {
        self.envelopes.push((to, message));
    }

    pub fn broadcast(&mut self, recipients: &[AgentId], message: Message) {
        self.envelopes
            .extend(recipients.iter().map(|&to| (to, message.clone())));
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (AgentId, Message)> {
        self.envelopes.drain(..)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn clear(&mut self) {
        self.envelopes.clear();
    }
}

/// Engine state an agent may use while perceiving or acting.
pub struct CycleContext<'a> {
    pub cycle: u64,
    pub config: &'a EngineConfig,
    pub rng: &'a mut ChaCha12Rng,
    pub attributes: &'a mut AttributeRegistry,
    pub outbox: &'a mut Outbox,
    /// Recipients of objective broadcasts.
    pub parameter_ids: &'a [AgentId],
    pub influence: Option<&'a mut (dyn InfluenceFunction + 'static)>,
    pub memory: Option<&'a CaseMemory>,
    pub report: &'a mut StepReport,
}

/// A scheduled control agent.
pub trait Agent {
    fn id(&self) -> AgentId;
    fn name(&self) -> &str;
    fn mailbox_mut(&mut self) -> &mut Mailbox;
    fn perceive(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError>;
    fn decide_and_act(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError>;
}
