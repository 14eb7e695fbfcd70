use crate::agent::{
    Agent, AgentId, AgentKind, CycleContext, MeasureAgent, Neighbour, ObjectiveAgent, Outbox,
    OutputAgent, ParameterAgent, ParameterUpdate, SatisfactionAgent, SituationAgent,
};
use crate::attribute::{
    AttributeProvider, AttributeRegistry, AttributeView, ReadableView, ViewKey,
    WritableAttributeProvider,
};
use crate::config::{DecisionStrategy, EngineConfig, Schedule};
use crate::correlation::CorrelationMatrix;
use crate::criticality::{CriticalityFunction, CriticalityFunctionParameters};
use crate::error::EngineError;
use crate::influence::InfluenceFunction;
use crate::memory::CaseMemory;
use crate::metrics::{CycleSample, RunSummary};
use crate::period::CriticalityHistory;
use crate::rng::create_rng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{info, trace, warn};

/// How an objective computes its criticality.
pub enum ObjectiveSpec {
    /// Broadcast objective: evaluated, normalized and sent to every parameter.
    Function(CriticalityFunction),
    /// Comfort curve over one attribute agent, answered by variation requests.
    Comfort {
        parameters: CriticalityFunctionParameters,
        relative_agent: String,
    },
}

/// Outcome of one engine cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepReport {
    pub cycle: u64,
    /// One entry per parameter that received any signal.
    pub updates: Vec<ParameterUpdate>,
    /// Objectives that detected a repeating criticality pattern.
    pub oscillations: Vec<String>,
    pub forwarded_requests: usize,
    pub propagation_rounds: usize,
    pub elapsed_us: u64,
}

impl StepReport {
    pub fn update_for(&self, parameter: &str) -> Option<&ParameterUpdate> {
        self.updates.iter().find(|u| u.parameter == parameter)
    }
}

/// Borrowed view of any agent, returned by the lookup operations.
#[derive(Clone, Copy, Debug)]
pub enum AgentRef<'a> {
    Measure(&'a MeasureAgent),
    Output(&'a OutputAgent),
    Satisfaction(&'a SatisfactionAgent),
    Objective(&'a ObjectiveAgent),
    Parameter(&'a ParameterAgent),
    Situation(&'a SituationAgent),
}

impl<'a> AgentRef<'a> {
    pub fn id(&self) -> AgentId {
        match *self {
            Self::Measure(a) => a.id(),
            Self::Output(a) => a.id(),
            Self::Satisfaction(a) => a.id(),
            Self::Objective(a) => a.id(),
            Self::Parameter(a) => a.id(),
            Self::Situation(a) => a.id(),
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            Self::Measure(a) => a.name(),
            Self::Output(a) => a.name(),
            Self::Satisfaction(a) => a.name(),
            Self::Objective(a) => a.name(),
            Self::Parameter(a) => a.name(),
            Self::Situation(a) => a.name(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.id().kind
    }

    /// Perceived value of an attribute agent.
    pub fn value(&self) -> Option<f64> {
        match *self {
            Self::Measure(a) => Some(a.value()),
            Self::Output(a) => Some(a.value()),
            Self::Parameter(a) => Some(a.value()),
            _ => None,
        }
    }

    /// Last criticality of an objective or satisfaction agent.
    pub fn criticality(&self) -> Option<f64> {
        match *self {
            Self::Satisfaction(a) => Some(a.criticality()),
            Self::Objective(a) => Some(a.criticality()),
            _ => None,
        }
    }
}

/// Shared engine state lent to agents through a [`CycleContext`].
struct Runtime {
    config: EngineConfig,
    rng: ChaCha12Rng,
    cycle: u64,
    attributes: AttributeRegistry,
    outbox: Outbox,
    influence: Option<Box<dyn InfluenceFunction>>,
    memory: Option<CaseMemory>,
    parameter_ids: Vec<AgentId>,
}

impl Runtime {
    fn context<'a>(&'a mut self, report: &'a mut StepReport) -> CycleContext<'a> {
        CycleContext {
            cycle: self.cycle,
            config: &self.config,
            rng: &mut self.rng,
            attributes: &mut self.attributes,
            outbox: &mut self.outbox,
            parameter_ids: &self.parameter_ids,
            influence: self.influence.as_deref_mut(),
            memory: self.memory.as_ref(),
            report,
        }
    }
}

/// Typed arenas, one per scheduled kind, indexed by `AgentId::index`.
#[derive(Default)]
struct Agents {
    measures: Vec<MeasureAgent>,
    outputs: Vec<OutputAgent>,
    satisfactions: Vec<SatisfactionAgent>,
    objectives: Vec<ObjectiveAgent>,
    parameters: Vec<ParameterAgent>,
}

impl Agents {
    fn get_mut(&mut self, id: AgentId) -> Option<&mut dyn Agent> {
        let i = id.index();
        match id.kind {
            AgentKind::Measure => self.measures.get_mut(i).map(|a| a as &mut dyn Agent),
            AgentKind::Output => self.outputs.get_mut(i).map(|a| a as &mut dyn Agent),
            AgentKind::Satisfaction => self.satisfactions.get_mut(i).map(|a| a as &mut dyn Agent),
            AgentKind::Objective => self.objectives.get_mut(i).map(|a| a as &mut dyn Agent),
            AgentKind::Parameter => self.parameters.get_mut(i).map(|a| a as &mut dyn Agent),
            AgentKind::Situation => None,
        }
    }

    fn count(&self, kind: AgentKind) -> usize {
        match kind {
            AgentKind::Measure => self.measures.len(),
            AgentKind::Output => self.outputs.len(),
            AgentKind::Satisfaction => self.satisfactions.len(),
            AgentKind::Objective => self.objectives.len(),
            AgentKind::Parameter => self.parameters.len(),
            AgentKind::Situation => 0,
        }
    }

    fn ids(&self, kind: AgentKind) -> Vec<AgentId> {
        (0..self.count(kind)).map(|i| AgentId::new(kind, i)).collect()
    }

    /// Move every queued message into its recipient's mailbox.
    fn deliver(&mut self, outbox: &mut Outbox) {
        for (to, message) in outbox.drain() {
            match self.get_mut(to) {
                Some(agent) => {
                    trace!(%to, ?message, "delivering message");
                    agent.mailbox_mut().push(message);
                }
                None => warn!(%to, "dropping message for unknown agent"),
            }
        }
    }

    fn clear_mailboxes(&mut self) {
        for kind in AgentKind::CONTROL {
            for id in self.ids(kind) {
                if let Some(agent) = self.get_mut(id) {
                    agent.mailbox_mut().clear();
                }
            }
        }
    }
}

struct AttributeDeclaration {
    name: String,
    key: ViewKey,
}

/// What was registered before `setup()`.
#[derive(Default)]
struct Declarations {
    measures: Vec<AttributeDeclaration>,
    outputs: Vec<AttributeDeclaration>,
    parameters: Vec<AttributeDeclaration>,
    objectives: Vec<(String, ObjectiveSpec)>,
}

impl Declarations {
    fn attribute_agent(&self, name: &str) -> Option<AgentId> {
        let find = |list: &[AttributeDeclaration], kind| {
            list.iter()
                .position(|d| d.name == name)
                .map(|i| AgentId::new(kind, i))
        };
        find(&self.measures, AgentKind::Measure)
            .or_else(|| find(&self.outputs, AgentKind::Output))
            .or_else(|| find(&self.parameters, AgentKind::Parameter))
    }

    fn objective_count(&self, comfort: bool) -> usize {
        self.objectives
            .iter()
            .filter(|(_, spec)| matches!(spec, ObjectiveSpec::Comfort { .. }) == comfort)
            .count()
    }
}

/// The calibration engine: owns every agent, the attribute views, the
/// seeded RNG and the cycle counter.
pub struct World {
    runtime: Runtime,
    agents: Agents,
    declarations: Declarations,
    correlation: CorrelationMatrix,
    creation_order: Vec<AgentId>,
    directory: HashMap<String, AgentId>,
    set_up: bool,
    ticks_until_step: u32,
}

impl World {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = create_rng(config.seed);
        let ticks_until_step = config.tick_interval;
        Ok(Self {
            runtime: Runtime {
                config,
                rng,
                cycle: 0,
                attributes: AttributeRegistry::default(),
                outbox: Outbox::default(),
                influence: None,
                memory: None,
                parameter_ids: Vec::new(),
            },
            agents: Agents::default(),
            declarations: Declarations::default(),
            correlation: CorrelationMatrix::default(),
            creation_order: Vec::new(),
            directory: HashMap::new(),
            set_up: false,
            ticks_until_step,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.runtime.config
    }

    /// Number of completed cycles.
    pub fn cycle(&self) -> u64 {
        self.runtime.cycle
    }

    pub fn is_set_up(&self) -> bool {
        self.set_up
    }

    pub fn case_memory(&self) -> Option<&CaseMemory> {
        self.runtime.memory.as_ref()
    }

    fn ensure_registering(&self) -> Result<(), EngineError> {
        if self.set_up {
            return Err(EngineError::AlreadySetUp);
        }
        Ok(())
    }

    fn ensure_unclaimed(&self, name: &str) -> Result<(), EngineError> {
        let taken = self.runtime.attributes.key(name).is_some()
            || self.declarations.objectives.iter().any(|(n, _)| n == name);
        if taken {
            return Err(EngineError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Register a writable attribute; it becomes a parameter agent at setup.
    pub fn add_parameter<P>(&mut self, view: AttributeView<P>) -> Result<AgentId, EngineError>
    where
        P: WritableAttributeProvider + 'static,
    {
        self.ensure_registering()?;
        self.ensure_unclaimed(view.name())?;
        let name = view.name().to_string();
        let key = self.runtime.attributes.insert_writable(Box::new(view))?;
        let id = AgentId::new(AgentKind::Parameter, self.declarations.parameters.len());
        self.declarations
            .parameters
            .push(AttributeDeclaration { name, key });
        Ok(id)
    }

    /// Register an observed attribute that relays variation requests.
    pub fn add_measure<P>(&mut self, view: AttributeView<P>) -> Result<AgentId, EngineError>
    where
        P: AttributeProvider + 'static,
    {
        let declaration = self.register_readable(view)?;
        let id = AgentId::new(AgentKind::Measure, self.declarations.measures.len());
        self.declarations.measures.push(declaration);
        Ok(id)
    }

    /// Register an observed attribute that only feeds objectives.
    pub fn add_output<P>(&mut self, view: AttributeView<P>) -> Result<AgentId, EngineError>
    where
        P: AttributeProvider + 'static,
    {
        let declaration = self.register_readable(view)?;
        let id = AgentId::new(AgentKind::Output, self.declarations.outputs.len());
        self.declarations.outputs.push(declaration);
        Ok(id)
    }

    fn register_readable<P>(&mut self, view: AttributeView<P>) -> Result<AttributeDeclaration, EngineError>
    where
        P: AttributeProvider + 'static,
    {
        self.ensure_registering()?;
        self.ensure_unclaimed(view.name())?;
        let name = view.name().to_string();
        let key = self.runtime.attributes.insert_readable(Box::new(view))?;
        Ok(AttributeDeclaration { name, key })
    }

    /// Declare an objective. Names of inputs and relative agents are
    /// resolved at setup.
    pub fn add_objective(
        &mut self,
        name: impl Into<String>,
        spec: ObjectiveSpec,
    ) -> Result<AgentId, EngineError> {
        self.ensure_registering()?;
        let name = name.into();
        self.ensure_unclaimed(&name)?;
        let id = match spec {
            ObjectiveSpec::Comfort { .. } => {
                AgentId::new(AgentKind::Satisfaction, self.declarations.objective_count(true))
            }
            ObjectiveSpec::Function(_) => {
                AgentId::new(AgentKind::Objective, self.declarations.objective_count(false))
            }
        };
        self.declarations.objectives.push((name, spec));
        Ok(id)
    }

    pub fn set_correlation_matrix(&mut self, matrix: CorrelationMatrix) -> Result<(), EngineError> {
        self.ensure_registering()?;
        self.correlation = matrix;
        Ok(())
    }

    /// Switch parameters from learned to probed influence.
    pub fn set_influence_function<F>(&mut self, function: F) -> Result<(), EngineError>
    where
        F: InfluenceFunction + 'static,
    {
        self.ensure_registering()?;
        self.runtime.influence = Some(Box::new(function));
        Ok(())
    }

    /// Check every name reference before anything is built.
    fn validate_wiring(&self) -> Result<(), EngineError> {
        let declarations = &self.declarations;
        for (_, spec) in &declarations.objectives {
            match spec {
                ObjectiveSpec::Comfort { relative_agent, .. } => {
                    if declarations.attribute_agent(relative_agent).is_none() {
                        return Err(EngineError::UnknownAgent(relative_agent.clone()));
                    }
                }
                ObjectiveSpec::Function(function) => {
                    if let Some(missing) = function
                        .inputs()
                        .find(|input| declarations.attribute_agent(input).is_none())
                    {
                        return Err(EngineError::UnknownAgent(missing.to_string()));
                    }
                }
            }
        }
        for (row, neighbours) in self.correlation.rows() {
            match declarations.attribute_agent(row) {
                Some(id) if id.kind == AgentKind::Measure => {}
                Some(_) => return Err(EngineError::NotAMeasure(row.to_string())),
                None => return Err(EngineError::UnknownAgent(row.to_string())),
            }
            for neighbour in neighbours.keys() {
                match declarations.attribute_agent(neighbour) {
                    Some(id) if matches!(id.kind, AgentKind::Measure | AgentKind::Parameter) => {}
                    Some(_) => return Err(EngineError::InvalidCorrelationTarget(neighbour.clone())),
                    None => return Err(EngineError::UnknownAgent(neighbour.clone())),
                }
            }
        }
        Ok(())
    }

    /// Create every control agent, in kind order, and wire the correlation
    /// graph. Registration is closed afterwards.
    pub fn setup(&mut self) -> Result<(), EngineError> {
        self.ensure_registering()?;
        self.validate_wiring()?;
        let Declarations {
            measures,
            outputs,
            parameters,
            objectives,
        } = std::mem::take(&mut self.declarations);

        for (i, d) in measures.into_iter().enumerate() {
            let id = AgentId::new(AgentKind::Measure, i);
            self.directory.insert(d.name.clone(), id);
            self.agents.measures.push(MeasureAgent::new(id, d.name, d.key));
        }
        for (i, d) in outputs.into_iter().enumerate() {
            let id = AgentId::new(AgentKind::Output, i);
            self.directory.insert(d.name.clone(), id);
            self.agents.outputs.push(OutputAgent::new(id, d.name, d.key));
        }
        for (i, d) in parameters.iter().enumerate() {
            self.directory
                .insert(d.name.clone(), AgentId::new(AgentKind::Parameter, i));
        }

        let (comforts, functions): (Vec<_>, Vec<_>) = objectives
            .into_iter()
            .partition(|(_, spec)| matches!(spec, ObjectiveSpec::Comfort { .. }));
        for (name, spec) in comforts {
            let ObjectiveSpec::Comfort {
                parameters: thresholds,
                relative_agent,
            } = spec
            else {
                continue;
            };
            let (relative_id, relative_view) = self.resolve_attribute(&relative_agent)?;
            let id = AgentId::new(AgentKind::Satisfaction, self.agents.satisfactions.len());
            self.directory.insert(name.clone(), id);
            self.agents.satisfactions.push(SatisfactionAgent::new(
                id,
                name,
                thresholds,
                relative_id,
                relative_view,
            ));
        }
        for (name, spec) in functions {
            let ObjectiveSpec::Function(function) = spec else {
                continue;
            };
            let inputs = function
                .inputs()
                .map(|input| {
                    self.resolve_attribute(input)
                        .map(|(_, key)| (input.to_string(), key))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let id = AgentId::new(AgentKind::Objective, self.agents.objectives.len());
            let config = &self.runtime.config;
            let agent = ObjectiveAgent::new(
                id,
                name.clone(),
                function,
                inputs,
                config.normalizer.build(),
                CriticalityHistory::new(config.history_capacity, config.period_tolerance),
            );
            self.directory.insert(name, id);
            self.agents.objectives.push(agent);
        }

        for (i, d) in parameters.into_iter().enumerate() {
            let id = AgentId::new(AgentKind::Parameter, i);
            let domain = self.runtime.attributes.domain(d.key);
            self.agents.parameters.push(ParameterAgent::new(
                id,
                d.name,
                d.key,
                domain,
                &self.runtime.config,
            ));
        }
        self.runtime.parameter_ids = self.agents.ids(AgentKind::Parameter);
        self.wire_correlation();

        self.creation_order = AgentKind::CONTROL
            .into_iter()
            .flat_map(|kind| self.agents.ids(kind))
            .collect();
        if let DecisionStrategy::CaseMemory {
            k,
            candidate_factor,
            exact_match_threshold,
        } = self.runtime.config.decision
        {
            self.runtime.memory = Some(CaseMemory::new(k, candidate_factor, exact_match_threshold));
        }
        self.ticks_until_step = self.runtime.config.tick_interval;
        self.set_up = true;
        info!(
            measures = self.agents.measures.len(),
            outputs = self.agents.outputs.len(),
            satisfactions = self.agents.satisfactions.len(),
            objectives = self.agents.objectives.len(),
            parameters = self.agents.parameters.len(),
            probed_influence = self.runtime.influence.is_some(),
            case_memory = self.runtime.memory.is_some(),
            "engine set up"
        );
        Ok(())
    }

    fn resolve_attribute(&self, name: &str) -> Result<(AgentId, ViewKey), EngineError> {
        let id = self.directory.get(name).copied();
        let key = self.runtime.attributes.key(name);
        match (id, key) {
            (Some(id), Some(key)) => Ok((id, key)),
            _ => Err(EngineError::UnknownAgent(name.to_string())),
        }
    }

    fn wire_correlation(&mut self) {
        for measure in &mut self.agents.measures {
            let Some(row) = self.correlation.row(measure.name()) else {
                continue;
            };
            let neighbours = row
                .iter()
                .filter_map(|(name, &sign)| {
                    self.directory.get(name).map(|&id| Neighbour {
                        id,
                        name: name.clone(),
                        sign,
                    })
                })
                .collect();
            measure.set_neighbours(neighbours);
        }
    }

    /// Run one perceive / decide-and-act cycle.
    ///
    /// An error aborts the cycle; attribute caches and mailboxes are still
    /// reset so the next call starts clean.
    pub fn step(&mut self) -> Result<StepReport, EngineError> {
        if !self.set_up {
            return Err(EngineError::NotSetUp);
        }
        let start = Instant::now();
        self.runtime.cycle += 1;
        let mut report = StepReport {
            cycle: self.runtime.cycle,
            ..StepReport::default()
        };
        let outcome = match self.runtime.config.schedule.clone() {
            Schedule::CreationOrder => self.step_creation_order(&mut report),
            Schedule::Grouped { order } => self.step_grouped(&order, &mut report),
        };
        self.end_cycle();
        outcome?;
        report.elapsed_us = start.elapsed().as_micros() as u64;
        Ok(report)
    }

    /// Count down one external tick; run a cycle when the countdown expires.
    pub fn tick(&mut self) -> Result<Option<StepReport>, EngineError> {
        if !self.set_up {
            return Err(EngineError::NotSetUp);
        }
        self.ticks_until_step = self.ticks_until_step.saturating_sub(1);
        if self.ticks_until_step > 0 {
            return Ok(None);
        }
        self.ticks_until_step = self.runtime.config.tick_interval;
        self.step().map(Some)
    }

    fn end_cycle(&mut self) {
        self.runtime.attributes.invalidate_all();
        self.agents.clear_mailboxes();
        self.runtime.outbox.clear();
    }

    pub fn agent_by_id(&self, id: AgentId) -> Option<AgentRef<'_>> {
        let i = id.index();
        match id.kind {
            AgentKind::Measure => self.agents.measures.get(i).map(AgentRef::Measure),
            AgentKind::Output => self.agents.outputs.get(i).map(AgentRef::Output),
            AgentKind::Satisfaction => self.agents.satisfactions.get(i).map(AgentRef::Satisfaction),
            AgentKind::Objective => self.agents.objectives.get(i).map(AgentRef::Objective),
            AgentKind::Parameter => self.agents.parameters.get(i).map(AgentRef::Parameter),
            AgentKind::Situation => self
                .runtime
                .memory
                .as_ref()
                .and_then(|memory| memory.situations().get(i))
                .map(AgentRef::Situation),
        }
    }

    /// Control agents by name. Situations are only reachable by id.
    pub fn agent_by_name(&self, name: &str) -> Option<AgentRef<'_>> {
        self.directory
            .get(name)
            .and_then(|&id| self.agent_by_id(id))
    }

    pub fn agents_for_type(&self, kind: AgentKind) -> Vec<AgentRef<'_>> {
        let count = match kind {
            AgentKind::Situation => self.runtime.memory.as_ref().map_or(0, CaseMemory::len),
            _ => self.agents.count(kind),
        };
        (0..count)
            .filter_map(|i| self.agent_by_id(AgentId::new(kind, i)))
            .collect()
    }

    /// Current parameter values (read live from the host) and criticalities.
    pub fn sample(&self) -> CycleSample {
        let parameters = self
            .agents
            .parameters
            .iter()
            .map(|p| (p.name().to_string(), self.runtime.attributes.read(p.view())))
            .collect();
        let criticalities: BTreeMap<String, f64> = self
            .agents
            .objectives
            .iter()
            .map(|o| (o.name().to_string(), o.criticality()))
            .chain(
                self.agents
                    .satisfactions
                    .iter()
                    .map(|s| (s.name().to_string(), s.criticality())),
            )
            .collect();
        CycleSample::new(self.runtime.cycle, parameters, criticalities)
    }

    /// Step `steps` times, sampling every `sample_every` cycles and at the end.
    pub fn run(&mut self, steps: usize, sample_every: usize) -> Result<RunSummary, EngineError> {
        if sample_every == 0 {
            return Err(EngineError::InvalidSampleEvery);
        }
        let mut samples = Vec::with_capacity(steps / sample_every + 1);
        let mut converged_at = None;
        for step in 1..=steps {
            let report = self.step()?;
            let sample = self.sample();
            if converged_at.is_none() && sample.is_satisfied() {
                converged_at = Some(report.cycle);
            }
            if step % sample_every == 0 || step == steps {
                samples.push(sample);
            }
        }
        info!(steps, converged_at = ?converged_at, cycle = self.runtime.cycle, "run finished");
        Ok(RunSummary {
            schema_version: 1,
            steps,
            sample_every,
            samples,
            converged_at,
        })
    }
}

mod phases;
