use super::{Agent, AgentId, CycleContext, Outbox};
use crate::attribute::ViewKey;
use crate::correlation::Sign;
use crate::error::EngineError;
use crate::message::{Mailbox, Message, VariationRequest};
use tracing::trace;

/// Correlated agent a measure forwards requests to.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighbour {
    pub id: AgentId,
    pub name: String,
    pub sign: Sign,
}

/// Read-only observed attribute that relays variation requests along its
/// correlation row.
#[derive(Debug)]
pub struct MeasureAgent {
    id: AgentId,
    name: String,
    view: ViewKey,
    value: f64,
    neighbours: Vec<Neighbour>,
    mailbox: Mailbox,
}

impl MeasureAgent {
    pub(crate) fn new(id: AgentId, name: String, view: ViewKey) -> Self {
        Self {
            id,
            name,
            view,
            value: f64::NAN,
            neighbours: Vec::new(),
            mailbox: Mailbox::default(),
        }
    }

    pub(crate) fn set_neighbours(&mut self, neighbours: Vec<Neighbour>) {
        self.neighbours = neighbours;
    }

    /// Value perceived this cycle (`NaN` before the first cycle).
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn neighbours(&self) -> &[Neighbour] {
        &self.neighbours
    }

    pub(crate) fn has_pending_requests(&self) -> bool {
        self.mailbox.has_variation_requests()
    }

    /// Drop whatever is waiting; returns how many messages were discarded.
    pub(crate) fn discard_pending(&mut self) -> usize {
        let dropped = self.mailbox.len();
        self.mailbox.clear();
        dropped
    }

    /// Forward every pending request to each neighbour except the one it
    /// came from. Returns the number of copies sent.
    pub(crate) fn forward_requests(&mut self, outbox: &mut Outbox) -> usize {
        let mut sent = 0;
        for message in self.mailbox.take() {
            let Message::VariationRequest(request) = message else {
                continue;
            };
            for neighbour in &self.neighbours {
                if neighbour.name == request.sender_name {
                    continue;
                }
                let forwarded = VariationRequest {
                    sender_name: self.name.clone(),
                    criticality: request.criticality,
                    direction: neighbour.sign.apply(request.direction),
                };
                trace!(
                    from = %self.name,
                    to = %neighbour.name,
                    direction = ?forwarded.direction,
                    "forwarding variation request"
                );
                outbox.send(neighbour.id, Message::VariationRequest(forwarded));
                sent += 1;
            }
        }
        sent
    }
}

impl Agent for MeasureAgent {
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
        self.value = ctx.attributes.perceive(self.view);
        Ok(())
    }

    fn decide_and_act(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), EngineError> {
        ctx.report.forwarded_requests += self.forward_requests(ctx.outbox);
        Ok(())
    }
}

/// Read-only observed attribute that never relays anything.
#[derive(Debug)]
pub struct OutputAgent {
    id: AgentId,
    name: String,
    view: ViewKey,
    value: f64,
    mailbox: Mailbox,
}

impl OutputAgent {
    pub(crate) fn new(id: AgentId, name: String, view: ViewKey) -> Self {
        Self {
            id,
            name,
            view,
            value: f64::NAN,
            mailbox: Mailbox::default(),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Agent for OutputAgent {
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
        self.value = ctx.attributes.perceive(self.view);
        Ok(())
    }

    fn decide_and_act(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), EngineError> {
        self.mailbox.clear();
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
    use crate::message::Direction;

    fn request(sender: &str, direction: Direction) -> Message {
        Message::VariationRequest(VariationRequest {
            sender_name: sender.into(),
            criticality: 50.0,
            direction,
        })
    }

    fn measure_with_neighbours(harness: &mut Harness) -> MeasureAgent {
        let view = AttributeView::new("m", 0.0, 1.0, FnAttribute::new(|| 0.5)).unwrap();
        let key = harness.attributes.insert_readable(Box::new(view)).unwrap();
        let mut measure = MeasureAgent::new(AgentId::new(AgentKind::Measure, 0), "m".into(), key);
        measure.set_neighbours(vec![
            Neighbour {
                id: AgentId::new(AgentKind::Parameter, 0),
                name: "p".into(),
                sign: Sign::Negative,
            },
            Neighbour {
                id: AgentId::new(AgentKind::Measure, 1),
                name: "n".into(),
                sign: Sign::Positive,
            },
        ]);
        measure
    }

    #[test]
    fn forwards_with_sign_and_renamed_sender() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut measure = measure_with_neighbours(&mut harness);
        measure.mailbox_mut().push(request("s", Direction::Increase));
        measure.decide_and_act(&mut harness.context()).unwrap();
        assert_eq!(harness.report.forwarded_requests, 2);

        let sent = harness.sent();
        let Message::VariationRequest(to_parameter) = &sent[0].1 else {
            panic!("expected a variation request");
        };
        assert_eq!(sent[0].0, AgentId::new(AgentKind::Parameter, 0));
        assert_eq!(to_parameter.direction, Direction::Decrease);
        assert_eq!(to_parameter.sender_name, "m");
        assert!(measure.mailbox_mut().is_empty());
    }

    #[test]
    fn does_not_send_back_to_the_sender() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut measure = measure_with_neighbours(&mut harness);
        measure.mailbox_mut().push(request("n", Direction::Decrease));
        assert_eq!(measure.forward_requests(&mut harness.outbox), 1);
        assert_eq!(harness.sent()[0].0, AgentId::new(AgentKind::Parameter, 0));
    }

    #[test]
    fn perceive_reads_the_view() {
        let mut harness = Harness::new(EngineConfig::default());
        let mut measure = measure_with_neighbours(&mut harness);
        assert!(measure.value().is_nan());
        measure.perceive(&mut harness.context()).unwrap();
        assert_eq!(measure.value(), 0.5);
    }
}
