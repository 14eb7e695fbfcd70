use super::super::{StepReport, World};
use crate::agent::{AgentId, AgentKind};
use crate::error::EngineError;

impl World {
    fn perceive_agent(&mut self, id: AgentId, report: &mut StepReport) -> Result<(), EngineError> {
        let Some(agent) = self.agents.get_mut(id) else {
            return Ok(());
        };
        let mut ctx = self.runtime.context(report);
        agent.perceive(&mut ctx)
    }

    /// Let one agent decide, then hand its messages to their recipients so
    /// agents scheduled later in the cycle can read them.
    fn act_agent(&mut self, id: AgentId, report: &mut StepReport) -> Result<(), EngineError> {
        {
            let Some(agent) = self.agents.get_mut(id) else {
                return Ok(());
            };
            let mut ctx = self.runtime.context(report);
            agent.decide_and_act(&mut ctx)?;
        }
        self.agents.deliver(&mut self.runtime.outbox);
        Ok(())
    }

    /// Everyone perceives in creation order, then everyone acts in creation
    /// order.
    pub(in crate::world) fn step_creation_order(
        &mut self,
        report: &mut StepReport,
    ) -> Result<(), EngineError> {
        for i in 0..self.creation_order.len() {
            let id = self.creation_order[i];
            self.perceive_agent(id, report)?;
        }
        let mut prepared = false;
        for i in 0..self.creation_order.len() {
            let id = self.creation_order[i];
            if id.kind == AgentKind::Parameter && !prepared {
                self.prepare_parameter_phase(report);
                prepared = true;
            }
            self.act_agent(id, report)?;
        }
        if !prepared {
            self.prepare_parameter_phase(report);
        }
        self.close_situation();
        Ok(())
    }

    /// Each kind perceives then acts before the next kind starts.
    pub(in crate::world) fn step_grouped(
        &mut self,
        order: &[AgentKind],
        report: &mut StepReport,
    ) -> Result<(), EngineError> {
        for &kind in order {
            let ids = self.agents.ids(kind);
            for &id in &ids {
                self.perceive_agent(id, report)?;
            }
            if kind == AgentKind::Parameter {
                self.prepare_parameter_phase(report);
            }
            for &id in &ids {
                self.act_agent(id, report)?;
            }
        }
        self.close_situation();
        Ok(())
    }

    /// Settle pending variation requests and, under case memory, snapshot
    /// the situation parameters are about to act in.
    fn prepare_parameter_phase(&mut self, report: &mut StepReport) {
        self.step_propagation_phase(report);
        self.open_situation();
    }
}
