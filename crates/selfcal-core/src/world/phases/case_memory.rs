use super::super::World;
use crate::agent::ParameterAgent;
use tracing::trace;

impl World {
    /// Close the previous situation with this cycle's variations and open a
    /// new one for the state parameters are about to act in.
    pub(in crate::world) fn open_situation(&mut self) {
        let Some(memory) = self.runtime.memory.as_mut() else {
            return;
        };
        let outcome = self
            .agents
            .objectives
            .iter()
            .map(|o| o.variation())
            .chain(self.agents.satisfactions.iter().map(|s| s.variation()))
            .collect();
        memory.record_outcome(outcome);

        let state = self
            .agents
            .measures
            .iter()
            .map(|m| m.value())
            .chain(self.agents.outputs.iter().map(|o| o.value()))
            .collect();
        let parameters = self.agents.parameters.iter().map(|p| p.value()).collect();
        let id = memory.open(self.runtime.cycle, state, parameters);
        trace!(%id, neighbours = memory.neighbours().count(), "situation opened");
    }

    pub(in crate::world) fn close_situation(&mut self) {
        if let Some(memory) = self.runtime.memory.as_mut() {
            memory.record_actions(
                self.agents
                    .parameters
                    .iter()
                    .map(ParameterAgent::action)
                    .collect(),
            );
        }
    }
}
