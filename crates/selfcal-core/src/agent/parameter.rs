use super::{Agent, AgentId, CycleContext};
use crate::adaptive_step::AdaptiveStep;
use crate::attribute::{Domain, ViewKey};
use crate::config::EngineConfig;
use crate::constants::TIE_TOLERANCE;
use crate::error::EngineError;
use crate::influence::{InfluenceMap, InfluenceQuery};
use crate::message::{Direction, Mailbox, Message, VariationRequest};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// What a parameter agent decided in one cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub parameter: String,
    pub previous: f64,
    pub value: f64,
    pub direction: Direction,
    pub step: f64,
    /// Objective the parameter chose to help; `None` on the request path.
    pub objective: Option<String>,
    /// The direction came from the case memory rather than the influence sign.
    pub from_case_memory: bool,
}

/// Owns one writable attribute and moves it to reduce the most critical
/// objective it can influence.
#[derive(Debug)]
pub struct ParameterAgent {
    id: AgentId,
    name: String,
    view: ViewKey,
    domain: Domain,
    value: f64,
    influence: InfluenceMap,
    step: AdaptiveStep,
    request_step: AdaptiveStep,
    /// Raw criticalities seen on the previous criticality-path decision.
    last_raw: BTreeMap<String, f64>,
    /// Direction taken on the previous criticality-path decision.
    last_direction: Direction,
    /// Direction taken this cycle, whichever path produced it.
    action: Direction,
    mailbox: Mailbox,
}

struct Selection<'m> {
    objective: &'m str,
    criticality: f64,
}

impl ParameterAgent {
    pub(crate) fn new(
        id: AgentId,
        name: String,
        view: ViewKey,
        domain: Domain,
        config: &EngineConfig,
    ) -> Self {
        let range = domain.range();
        Self {
            id,
            name,
            view,
            domain,
            value: f64::NAN,
            influence: InfluenceMap::new(
                config.influence_smoothing,
                config.influence_epsilon,
                config.initial_influence,
            ),
            step: AdaptiveStep::relative(
                range,
                config.initial_step_ratio,
                config.min_step_ratio,
                config.max_step_ratio,
            ),
            request_step: AdaptiveStep::new(
                config.request_initial_step,
                config.request_min_step_ratio * range,
                config.request_max_step_ratio * range,
            ),
            last_raw: BTreeMap::new(),
            last_direction: Direction::Stay,
            action: Direction::Stay,
            mailbox: Mailbox::default(),
        }
    }

    /// Value perceived at the start of the cycle.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub(crate) fn view(&self) -> ViewKey {
        self.view
    }

    pub fn influence(&self) -> &InfluenceMap {
        &self.influence
    }

    /// Direction taken in the current (or last completed) cycle.
    pub fn action(&self) -> Direction {
        self.action
    }

    pub fn step_size(&self) -> f64 {
        self.step.delta()
    }

    /// Refresh influence coefficients for every objective heard this cycle.
    fn update_influence(&mut self, ctx: &mut CycleContext<'_>, raw: &BTreeMap<String, f64>) {
        for (objective, &current) in raw {
            if let Some(probe) = ctx.influence.as_deref_mut() {
                let raw = probe.influence(&InfluenceQuery {
                    parameter: &self.name,
                    objective,
                    value: self.value,
                    cycle: ctx.cycle,
                });
                self.influence.set_probed(objective, raw);
            } else if let Some(&previous) = self.last_raw.get(objective) {
                if current.is_finite() && previous.is_finite() {
                    self.influence
                        .learn(objective, current - previous, self.last_direction);
                }
            }
        }
    }

    /// Most critical objective among those not excluded for oscillating.
    /// Ties within the top group are broken with the engine RNG, over the
    /// group in objective-name order.
    fn select<'m>(
        &self,
        ctx: &mut CycleContext<'_>,
        criticalities: &'m BTreeMap<String, f64>,
        oscillating: &BTreeSet<String>,
    ) -> Option<Selection<'m>> {
        let candidates: Vec<(&'m str, f64)> = criticalities
            .iter()
            .filter(|(_, c)| c.is_finite())
            .filter(|(objective, _)| {
                !(oscillating.contains(*objective) && self.influence.get(objective) != 0.0)
            })
            .map(|(objective, &c)| (objective.as_str(), c))
            .collect();
        let top = candidates
            .iter()
            .map(|(_, c)| c.abs())
            .fold(f64::NEG_INFINITY, f64::max);
        let group: Vec<(&'m str, f64)> = candidates
            .into_iter()
            .filter(|(_, c)| (top - c.abs()).abs() <= TIE_TOLERANCE)
            .collect();
        let pick = match group.len() {
            0 => return None,
            1 => 0,
            n => ctx.rng.random_range(0..n),
        };
        let (objective, criticality) = group[pick];
        Some(Selection {
            objective,
            criticality,
        })
    }

    fn act_on_criticality(
        &mut self,
        ctx: &mut CycleContext<'_>,
        criticalities: BTreeMap<String, f64>,
        raw: BTreeMap<String, f64>,
        oscillating: BTreeSet<String>,
    ) {
        self.update_influence(ctx, &raw);

        let selection = self.select(ctx, &criticalities, &oscillating);
        let mut direction = Direction::Stay;
        let mut from_case_memory = false;
        if let Some(selected) = &selection {
            if selected.criticality != 0.0 {
                let mut coefficient = self.influence.get(selected.objective);
                if coefficient == 0.0 && ctx.influence.is_none() {
                    // A learned zero is never revisited after a Stay; start over.
                    coefficient = self.influence.forget(selected.objective);
                    debug!(
                        parameter = %self.name,
                        objective = selected.objective,
                        coefficient,
                        "learned influence vanished, exploring again"
                    );
                }
                direction = Direction::from_sign(-selected.criticality * coefficient);
                let vote = ctx.memory.and_then(|memory| memory.vote(self.id.index()));
                if let Some(voted) = vote {
                    from_case_memory = voted != direction;
                    direction = voted;
                }
            }
        }

        let step = self.step.next(direction);
        let objective = selection.map(|s| s.objective.to_string());
        self.apply(ctx, direction, step, objective, from_case_memory);
        self.last_direction = direction;
        self.last_raw = raw;
    }

    /// Request path: the largest requests decide, unless they disagree.
    fn act_on_requests(&mut self, ctx: &mut CycleContext<'_>, requests: Vec<VariationRequest>) {
        let requests: Vec<VariationRequest> = requests
            .into_iter()
            .filter(|r| r.criticality.is_finite())
            .collect();
        let top = requests
            .iter()
            .map(|r| r.criticality.abs())
            .fold(f64::NEG_INFINITY, f64::max);
        let mut top_directions = requests
            .iter()
            .filter(|r| (top - r.criticality.abs()).abs() <= TIE_TOLERANCE)
            .map(|r| r.direction)
            .filter(|d| !d.is_stay());
        let first = top_directions.next();
        let unanimous = top_directions.all(|d| Some(d) == first);
        let direction = match first {
            None => Direction::Stay,
            Some(first) if unanimous => first,
            Some(_) => {
                debug!(parameter = %self.name, "no dominant direction among requests");
                Direction::Stay
            }
        };
        let step = self.request_step.next(direction);
        self.apply(ctx, direction, step, None, false);
        self.last_raw.clear();
    }

    fn apply(
        &mut self,
        ctx: &mut CycleContext<'_>,
        direction: Direction,
        step: f64,
        objective: Option<String>,
        from_case_memory: bool,
    ) {
        let previous = self.value;
        let mut value = previous;
        if !direction.is_stay() {
            let target = self.domain.clamp(previous + step * direction.sign());
            value = ctx.attributes.write(self.view, target).unwrap_or(target);
        }
        self.action = direction;
        debug!(
            parameter = %self.name,
            previous,
            value,
            ?direction,
            step,
            objective = objective.as_deref().unwrap_or("-"),
            "parameter decision"
        );
        ctx.report.updates.push(ParameterUpdate {
            parameter: self.name.clone(),
            previous,
            value,
            direction,
            step,
            objective,
            from_case_memory,
        });
    }
}

impl Agent for ParameterAgent {
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
        let mut criticalities = BTreeMap::new();
        let mut raw = BTreeMap::new();
        let mut oscillating = BTreeSet::new();
        let mut requests = Vec::new();
        for message in self.mailbox.take() {
            match message {
                Message::Criticality(m) => {
                    raw.insert(m.objective.clone(), m.raw);
                    criticalities.insert(m.objective, m.criticality);
                }
                Message::OscillationDetected { objective } => {
                    oscillating.insert(objective);
                }
                Message::VariationRequest(request) => requests.push(request),
            }
        }

        self.action = Direction::Stay;
        if !criticalities.is_empty() {
            self.act_on_criticality(ctx, criticalities, raw, oscillating);
        } else if !requests.is_empty() {
            self.act_on_requests(ctx, requests);
        } else {
            trace!(parameter = %self.name, "no signal, idle");
            self.last_raw.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::Harness;
    use crate::agent::AgentKind;
    use crate::attribute::{AttributeView, FnWritableAttribute};
    use crate::message::CriticalityMessage;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Fixture {
        harness: Harness,
        host: Rc<Cell<f64>>,
        agent: ParameterAgent,
    }

    fn fixture(start: f64, config: EngineConfig) -> Fixture {
        let mut harness = Harness::new(config);
        let host = Rc::new(Cell::new(start));
        let (r, w) = (Rc::clone(&host), Rc::clone(&host));
        let view = AttributeView::new(
            "p",
            0.0,
            10.0,
            FnWritableAttribute::new(move || r.get(), move |v| w.set(v)),
        )
        .unwrap();
        let domain = crate::attribute::ReadableView::domain(&view);
        let key = harness.attributes.insert_writable(Box::new(view)).unwrap();
        let agent = ParameterAgent::new(
            AgentId::new(AgentKind::Parameter, 0),
            "p".into(),
            key,
            domain,
            &harness.config,
        );
        Fixture {
            harness,
            host,
            agent,
        }
    }

    impl Fixture {
        fn cycle(&mut self, messages: Vec<Message>) -> ParameterUpdate {
            self.harness.attributes.invalidate_all();
            self.harness.report.updates.clear();
            for message in messages {
                self.agent.mailbox_mut().push(message);
            }
            self.agent.perceive(&mut self.harness.context()).unwrap();
            self.agent
                .decide_and_act(&mut self.harness.context())
                .unwrap();
            self.harness.report.updates[0].clone()
        }
    }

    fn criticality(objective: &str, criticality: f64) -> Message {
        scaled(objective, criticality, criticality)
    }

    fn scaled(objective: &str, criticality: f64, raw: f64) -> Message {
        Message::Criticality(CriticalityMessage {
            objective: objective.into(),
            criticality,
            raw,
        })
    }

    fn request(criticality: f64, direction: Direction) -> Message {
        Message::VariationRequest(VariationRequest {
            sender_name: "s".into(),
            criticality,
            direction,
        })
    }

    #[test]
    fn idle_without_messages() {
        let mut f = fixture(5.0, EngineConfig::default());
        f.agent.perceive(&mut f.harness.context()).unwrap();
        f.agent.decide_and_act(&mut f.harness.context()).unwrap();
        assert!(f.harness.report.updates.is_empty());
        assert_eq!(f.host.get(), 5.0);
    }

    #[test]
    fn positive_criticality_with_positive_influence_decreases() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![criticality("o", 0.8)]);
        assert_eq!(update.direction, Direction::Decrease);
        assert_eq!(update.objective.as_deref(), Some("o"));
        assert!((update.step - 1e-3).abs() < 1e-12);
        assert!((f.host.get() - (5.0 - 1e-3)).abs() < 1e-12);
    }

    #[test]
    fn picks_the_most_critical_objective() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![criticality("a", 0.2), criticality("b", -0.9)]);
        assert_eq!(update.objective.as_deref(), Some("b"));
        assert_eq!(update.direction, Direction::Increase);
    }

    #[test]
    fn tie_break_is_reproducible_for_a_seed() {
        let pick = |seed| {
            let mut f = fixture(5.0, EngineConfig {
                seed,
                ..EngineConfig::default()
            });
            f.cycle(vec![criticality("a", 0.5), criticality("b", -0.5), criticality("c", 0.5)])
                .objective
        };
        assert_eq!(pick(3), pick(3));
        assert!(pick(3).is_some());
    }

    #[test]
    fn oscillating_objective_with_influence_is_ignored() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![
            criticality("a", 0.9),
            Message::OscillationDetected {
                objective: "a".into(),
            },
            criticality("b", 0.1),
        ]);
        assert_eq!(update.objective.as_deref(), Some("b"));
    }

    #[test]
    fn learns_negative_influence_and_reverses() {
        let config = EngineConfig {
            influence_smoothing: 0.0,
            ..EngineConfig::default()
        };
        let mut f = fixture(5.0, config);
        assert_eq!(f.cycle(vec![criticality("o", 0.5)]).direction, Direction::Decrease);
        // Moving down made the objective worse: the influence must flip.
        let update = f.cycle(vec![criticality("o", 0.6)]);
        assert_eq!(f.agent.influence().get("o"), -1.0);
        assert_eq!(update.direction, Direction::Increase);
    }

    #[test]
    fn learns_from_raw_change_when_normalized_value_is_flat() {
        let config = EngineConfig {
            influence_smoothing: 0.0,
            ..EngineConfig::default()
        };
        let mut f = fixture(5.0, config);
        assert_eq!(f.cycle(vec![scaled("o", 1.0, 3.0)]).direction, Direction::Decrease);
        let update = f.cycle(vec![scaled("o", 1.0, 3.001)]);
        assert_eq!(f.agent.influence().get("o"), -1.0);
        assert_eq!(update.direction, Direction::Increase);
    }

    #[test]
    fn vanished_learned_influence_explores_again() {
        let config = EngineConfig {
            influence_smoothing: 0.0,
            ..EngineConfig::default()
        };
        let mut f = fixture(5.0, config);
        f.cycle(vec![criticality("o", 0.5)]);
        let update = f.cycle(vec![criticality("o", 0.5)]);
        assert_eq!(update.direction, Direction::Decrease);
        assert_eq!(f.agent.influence().get("o"), 1.0);
    }

    #[test]
    fn non_finite_criticality_does_not_mask_finite_ones() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![
            criticality("broken", f64::INFINITY),
            criticality("nan", f64::NAN),
            criticality("o", 0.5),
        ]);
        assert_eq!(update.objective.as_deref(), Some("o"));
        assert_eq!(update.direction, Direction::Decrease);
    }

    #[test]
    fn non_finite_requests_are_ignored() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![
            request(f64::INFINITY, Direction::Decrease),
            request(40.0, Direction::Increase),
        ]);
        assert_eq!(update.direction, Direction::Increase);
        assert_eq!(f.host.get(), 6.0);
    }

    #[test]
    fn injected_influence_overrides_learning() {
        let mut f = fixture(5.0, EngineConfig::default());
        fn estimate(query: &InfluenceQuery<'_>) -> f64 {
            if query.objective == "o" {
                -0.5
            } else {
                0.0
            }
        }
        let mut estimate = estimate;
        let estimate: &mut dyn crate::influence::InfluenceFunction = &mut estimate;
        f.harness.attributes.invalidate_all();
        f.agent.mailbox_mut().push(criticality("o", 0.5));
        f.agent.perceive(&mut f.harness.context()).unwrap();
        let mut ctx = f.harness.context();
        ctx.influence = Some(estimate);
        f.agent.decide_and_act(&mut ctx).unwrap();
        assert_eq!(f.agent.influence().get("o"), -0.5);
        assert_eq!(f.agent.action(), Direction::Increase);
    }

    #[test]
    fn zero_influence_stays() {
        let config = EngineConfig {
            initial_influence: 0.0,
            ..EngineConfig::default()
        };
        let mut f = fixture(5.0, config);
        let update = f.cycle(vec![criticality("o", 0.5)]);
        assert_eq!(update.direction, Direction::Stay);
        assert_eq!(f.host.get(), 5.0);
    }

    #[test]
    fn request_path_moves_by_the_request_step() {
        let mut f = fixture(0.0, EngineConfig::default());
        let update = f.cycle(vec![request(100.0, Direction::Increase)]);
        assert_eq!(update.value, 1.0);
        assert_eq!(f.host.get(), 1.0);
        let update = f.cycle(vec![request(80.0, Direction::Increase)]);
        assert_eq!(update.value, 3.0);
    }

    #[test]
    fn conflicting_top_requests_resolve_to_stay() {
        let mut f = fixture(5.0, EngineConfig::default());
        let update = f.cycle(vec![
            request(100.0, Direction::Increase),
            request(-100.0, Direction::Decrease),
            request(10.0, Direction::Increase),
        ]);
        assert_eq!(update.direction, Direction::Stay);
        assert_eq!(f.host.get(), 5.0);
    }

    #[test]
    fn writes_are_clamped_to_the_domain() {
        let mut f = fixture(9.5, EngineConfig::default());
        let update = f.cycle(vec![request(100.0, Direction::Increase)]);
        assert_eq!(update.value, 10.0);
    }
}
