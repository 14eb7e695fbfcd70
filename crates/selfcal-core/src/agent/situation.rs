use super::AgentId;
use crate::message::Direction;

/// One recorded case: what the model looked like, what every parameter did,
/// and how the objectives reacted on the following cycle.
///
/// A new situation is created every cycle under the case-memory strategy and
/// is never removed. It is not scheduled; it only answers KNN queries.
#[derive(Clone, Debug)]
pub struct SituationAgent {
    id: AgentId,
    name: String,
    cycle: u64,
    state: Vec<f64>,
    parameters: Vec<f64>,
    actions: Vec<Direction>,
    outcome: Option<Vec<f64>>,
}

impl SituationAgent {
    pub(crate) fn new(id: AgentId, cycle: u64, state: Vec<f64>, parameters: Vec<f64>) -> Self {
        Self {
            id,
            name: format!("situation-{}", id.index),
            cycle,
            state,
            parameters,
            actions: Vec::new(),
            outcome: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Observed attribute values (measures, then outputs).
    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Direction taken by each parameter, indexed like [`Self::parameters`].
    pub fn actions(&self) -> &[Direction] {
        &self.actions
    }

    /// Per-objective `|c| - |c_prev|` observed one cycle later.
    pub fn outcome(&self) -> Option<&[f64]> {
        self.outcome.as_deref()
    }

    /// Summed variation; negative means the action reduced total criticality.
    pub fn outcome_total(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.iter().sum())
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }

    pub(crate) fn set_actions(&mut self, actions: Vec<Direction>) {
        self.actions = actions;
    }

    pub(crate) fn set_outcome(&mut self, variations: Vec<f64>) {
        self.outcome = Some(variations);
    }
}
