use super::{Agent, AgentId, CycleContext};
use crate::attribute::ViewKey;
use crate::criticality::{CriticalityFunction, Values};
use crate::error::EngineError;
use crate::message::{CriticalityMessage, Mailbox, Message};
use crate::normalizer::Normalizer;
use crate::period::CriticalityHistory;
use tracing::debug;

/// Evaluates a criticality function over observed attributes and broadcasts
/// the normalized result to every parameter agent.
#[derive(Debug)]
pub struct ObjectiveAgent {
    id: AgentId,
    name: String,
    function: CriticalityFunction,
    inputs: Vec<(String, ViewKey)>,
    values: Values,
    normalizer: Normalizer,
    history: CriticalityHistory,
    raw: f64,
    criticality: f64,
    variation: f64,
    evaluated: bool,
    oscillating: bool,
    mailbox: Mailbox,
}

impl ObjectiveAgent {
    pub(crate) fn new(
        id: AgentId,
        name: String,
        function: CriticalityFunction,
        inputs: Vec<(String, ViewKey)>,
        normalizer: Normalizer,
        history: CriticalityHistory,
    ) -> Self {
        Self {
            id,
            name,
            function,
            inputs,
            values: Values::new(),
            normalizer,
            history,
            raw: 0.0,
            criticality: 0.0,
            variation: 0.0,
            evaluated: false,
            oscillating: false,
            mailbox: Mailbox::default(),
        }
    }

    /// Normalized criticality from the last evaluation.
    pub fn criticality(&self) -> f64 {
        self.criticality
    }

    /// Raw criticality before normalization.
    pub fn raw(&self) -> f64 {
        self.raw
    }

    /// `|c| - |c_prev|`; zero on the first evaluation.
    pub fn variation(&self) -> f64 {
        self.variation
    }

    /// Whether the last evaluation found a repeating pattern in the history.
    pub fn is_oscillating(&self) -> bool {
        self.oscillating
    }

    pub fn history(&self) -> &CriticalityHistory {
        &self.history
    }
}

impl Agent for ObjectiveAgent {
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
        self.values.clear();
        for (name, key) in &self.inputs {
            self.values.insert(name.clone(), ctx.attributes.perceive(*key));
        }
        Ok(())
    }

    fn decide_and_act(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError> {
        self.mailbox.clear();
        self.raw = self.function.evaluate(&self.values)?;
        let criticality = self.normalizer.normalize(self.raw);
        self.variation = if self.evaluated {
            criticality.abs() - self.criticality.abs()
        } else {
            0.0
        };
        self.criticality = criticality;
        self.evaluated = true;

        self.history.push(criticality);
        let period = self.history.detect_period();
        self.oscillating = period.is_some();
        if let Some(period) = period {
            debug!(objective = %self.name, period, cycle = ctx.cycle, "oscillation detected");
            ctx.report.oscillations.push(self.name.clone());
            ctx.outbox.broadcast(
                ctx.parameter_ids,
                Message::OscillationDetected {
                    objective: self.name.clone(),
                },
            );
        }
        ctx.outbox.broadcast(
            ctx.parameter_ids,
            Message::Criticality(CriticalityMessage {
                objective: self.name.clone(),
                criticality,
                raw: self.raw,
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

    fn objective(harness: &mut Harness, host: Rc<Cell<f64>>) -> ObjectiveAgent {
        let view = AttributeView::new("y", -100.0, 100.0, FnAttribute::new(move || host.get())).unwrap();
        let key = harness.attributes.insert_readable(Box::new(view)).unwrap();
        harness.parameter_ids = vec![
            AgentId::new(AgentKind::Parameter, 0),
            AgentId::new(AgentKind::Parameter, 1),
        ];
        ObjectiveAgent::new(
            AgentId::new(AgentKind::Objective, 0),
            "track".into(),
            CriticalityFunction::new(["y"], |v| v["y"] - 1.0),
            vec![("y".into(), key)],
            Normalizer::default(),
            CriticalityHistory::new(10, 1e-9),
        )
    }

    fn run_cycle(harness: &mut Harness, agent: &mut ObjectiveAgent) {
        harness.attributes.invalidate_all();
        agent.perceive(&mut harness.context()).unwrap();
        agent.decide_and_act(&mut harness.context()).unwrap();
    }

    #[test]
    fn broadcasts_normalized_criticality_to_every_parameter() {
        let mut harness = Harness::new(EngineConfig::default());
        let host = Rc::new(Cell::new(5.0));
        let mut agent = objective(&mut harness, Rc::clone(&host));
        run_cycle(&mut harness, &mut agent);

        assert_eq!(agent.raw(), 4.0);
        assert_eq!(agent.criticality(), 1.0);
        assert_eq!(agent.variation(), 0.0);
        let sent = harness.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, m)| matches!(
            m,
            Message::Criticality(CriticalityMessage { criticality, .. }) if *criticality == 1.0
        )));

        host.set(3.0);
        run_cycle(&mut harness, &mut agent);
        assert_eq!(agent.criticality(), 0.5);
        assert_eq!(agent.variation(), -0.5);
    }

    #[test]
    fn flags_oscillation_once_the_pattern_repeats() {
        let mut harness = Harness::new(EngineConfig::default());
        let host = Rc::new(Cell::new(0.0));
        let mut agent = objective(&mut harness, Rc::clone(&host));
        for (i, value) in [3.0, -1.0, 3.0, -1.0].into_iter().enumerate() {
            host.set(value);
            run_cycle(&mut harness, &mut agent);
            assert_eq!(agent.is_oscillating(), i == 3);
        }
        assert_eq!(harness.report.oscillations, vec!["track".to_string()]);
        let oscillation_messages = harness
            .sent()
            .into_iter()
            .filter(|(_, m)| matches!(m, Message::OscillationDetected { .. }))
            .count();
        assert_eq!(oscillation_messages, 2);
    }

    #[test]
    fn mismatched_inputs_abort_the_decision() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut agent = ObjectiveAgent::new(
            AgentId::new(AgentKind::Objective, 0),
            "broken".into(),
            CriticalityFunction::new(["a", "b"], |v| v["a"]),
            Vec::new(),
            Normalizer::default(),
            CriticalityHistory::new(10, 1e-9),
        );
        agent.perceive(&mut harness.context()).unwrap();
        assert!(matches!(
            agent.decide_and_act(&mut harness.context()),
            Err(EngineError::CriticalityInputMismatch { .. })
        ));
    }
}
