use super::{Agent, AgentId, CycleContext};
use crate::attribute::ViewKey;
use crate::criticality::CriticalityFunctionParameters;
use crate::error::EngineError;
use crate::message::{Direction, Mailbox, Message, VariationRequest};
use tracing::trace;

/// Comfort-curve objective over exactly one attribute agent. Instead of
/// broadcasting criticality it asks its relative agent to move.
#[derive(Debug)]
pub struct SatisfactionAgent {
    id: AgentId,
    name: String,
    parameters: CriticalityFunctionParameters,
    relative_id: AgentId,
    relative_view: ViewKey,
    value: f64,
    criticality: f64,
    variation: f64,
    mailbox: Mailbox,
}

impl SatisfactionAgent {
    pub(crate) fn new(
        id: AgentId,
        name: String,
        parameters: CriticalityFunctionParameters,
        relative_id: AgentId,
        relative_view: ViewKey,
    ) -> Self {
        Self {
            id,
            name,
            parameters,
            relative_id,
            relative_view,
            value: f64::NAN,
            criticality: 0.0,
            variation: 0.0,
            mailbox: Mailbox::default(),
        }
    }

    pub fn parameters(&self) -> &CriticalityFunctionParameters {
        &self.parameters
    }

    pub fn relative_agent(&self) -> AgentId {
        self.relative_id
    }

    /// Comfort criticality from the last decision, in `[-100, 100]`.
    pub fn criticality(&self) -> f64 {
        self.criticality
    }

    /// `|c| - |c_prev|` from the last decision.
    pub fn variation(&self) -> f64 {
        self.variation
    }

    /// Direction requested from the relative agent for the current value.
    pub fn requested_direction(&self) -> Direction {
        if self.criticality == 0.0 {
            Direction::Stay
        } else {
            self.parameters.direction_for(self.value)
        }
    }
}

impl Agent for SatisfactionAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    fn perceive(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError> {
        self.value = ctx.attributes.perceive(self.relative_view);
        Ok(())
    }

    fn decide_and_act(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError> {
        self.mailbox.clear();
        let criticality = self.parameters.comfort(self.value);
        self.variation = criticality.abs() - self.criticality.abs();
        self.criticality = criticality;

        let direction = self.requested_direction();
        if direction.is_stay() {
            return Ok(());
        }
        trace!(
            satisfaction = %self.name,
            value = self.value,
            criticality,
            ?direction,
            "requesting variation"
        );
        ctx.outbox.send(
            self.relative_id,
            Message::VariationRequest(VariationRequest {
                sender_name: self.name.clone(),
                criticality,
                direction,
            }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::Harness;
    use crate::agent::AgentKind;
    use crate::attribute::{AttributeView, FnAttribute};
    use crate::config::EngineConfig;
    use std::cell::Cell;
    use std::rc::Rc;

    fn agent_over(harness: &mut Harness, value: Rc<Cell<f64>>) -> SatisfactionAgent {
        let view = AttributeView::new("x", -10.0, 10.0, FnAttribute::new(move || value.get())).unwrap();
        let key = harness.attributes.insert_readable(Box::new(view)).unwrap();
        SatisfactionAgent::new(
            AgentId::new(AgentKind::Satisfaction, 0),
            "comfort".into(),
            CriticalityFunctionParameters::new(0.0, 1.0, 2.0, 3.0, 4.0, 5.0).unwrap(),
            AgentId::new(AgentKind::Measure, 0),
            key,
        )
    }

    #[test]
    fn below_the_band_requests_increase() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut agent = agent_over(&mut harness, Rc::new(Cell::new(0.5)));
        agent.perceive(&mut harness.context()).unwrap();
        agent.decide_and_act(&mut harness.context()).unwrap();

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, AgentId::new(AgentKind::Measure, 0));
        let Message::VariationRequest(request) = &sent[0].1 else {
            panic!("expected a variation request");
        };
        assert_eq!(request.direction, Direction::Increase);
        assert_eq!(request.sender_name, "comfort");
        assert!(request.criticality > 0.0);
    }

    #[test]
    fn inside_the_band_sends_nothing() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut agent = agent_over(&mut harness, Rc::new(Cell::new(2.5)));
        agent.perceive(&mut harness.context()).unwrap();
        agent.decide_and_act(&mut harness.context()).unwrap();
        assert!(harness.sent().is_empty());
        assert_eq!(agent.criticality(), 0.0);
    }

    #[test]
    fn above_the_band_requests_decrease_and_tracks_variation() {
        let mut harness = Harness::new(EngineConfig::default());
        let value = Rc::new(Cell::new(9.0));
        let mut agent = agent_over(&mut harness, Rc::clone(&value));
        agent.perceive(&mut harness.context()).unwrap();
        agent.decide_and_act(&mut harness.context()).unwrap();
        assert_eq!(agent.criticality(), -100.0);
        assert_eq!(agent.requested_direction(), Direction::Decrease);

        harness.attributes.invalidate_all();
        value.set(4.0);
        agent.perceive(&mut harness.context()).unwrap();
        agent.decide_and_act(&mut harness.context()).unwrap();
        assert!((agent.criticality() + 50.0).abs() < 1e-9);
        assert!((agent.variation() + 50.0).abs() < 1e-9);
    }
}
