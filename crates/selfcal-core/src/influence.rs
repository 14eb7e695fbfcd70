//! Estimating how a parameter affects each objective's criticality.

use crate::message::Direction;
use std::collections::BTreeMap;

/// What a parameter asks an injected influence function.
#[derive(Clone, Copy, Debug)]
pub struct InfluenceQuery<'a> {
    pub parameter: &'a str,
    pub objective: &'a str,
    /// Current (perceived) parameter value.
    pub value: f64,
    pub cycle: u64,
}

/// Externally supplied influence estimate, e.g. a probe of the host model.
///
/// The returned coefficient is clamped to `[-1, 1]`; its sign is what drives
/// the parameter's direction.
pub trait InfluenceFunction {
    fn influence(&mut self, query: &InfluenceQuery<'_>) -> f64;
}

impl<F> InfluenceFunction for F
where
    F: FnMut(&InfluenceQuery<'_>) -> f64,
{
    fn influence(&mut self, query: &InfluenceQuery<'_>) -> f64 {
        self(query)
    }
}

/// Per-parameter map `objective -> coefficient in [-1, 1]`.
#[derive(Clone, Debug)]
pub struct InfluenceMap {
    coefficients: BTreeMap<String, f64>,
    smoothing: f64,
    epsilon: f64,
    initial: f64,
}

impl InfluenceMap {
    pub fn new(smoothing: f64, epsilon: f64, initial: f64) -> Self {
        Self {
            coefficients: BTreeMap::new(),
            smoothing,
            epsilon,
            initial: initial.clamp(-1.0, 1.0),
        }
    }

    fn snap(&self, value: f64) -> f64 {
        if value.abs() < self.epsilon || !value.is_finite() {
            0.0
        } else {
            value.clamp(-1.0, 1.0)
        }
    }

    /// Coefficient for `objective`; objectives never seen start at the initial guess.
    pub fn get(&self, objective: &str) -> f64 {
        self.coefficients
            .get(objective)
            .copied()
            .unwrap_or(self.initial)
    }

    /// Overwrite with a probed coefficient.
    pub fn set_probed(&mut self, objective: &str, raw: f64) -> f64 {
        let value = self.snap(raw);
        self.coefficients.insert(objective.to_string(), value);
        value
    }

    /// Drop what was learned for `objective`; returns the initial guess it
    /// falls back to.
    pub fn forget(&mut self, objective: &str) -> f64 {
        self.coefficients.remove(objective);
        self.initial
    }

    /// Smoothed update after moving in `last_direction` and observing
    /// `delta_criticality` on `objective`.
    pub fn learn(&mut self, objective: &str, delta_criticality: f64, last_direction: Direction) -> f64 {
        let old = self.get(objective);
        if last_direction.is_stay() {
            return old;
        }
        let sample = if delta_criticality == 0.0 {
            0.0
        } else if delta_criticality.signum() == last_direction.sign() {
            1.0
        } else {
            -1.0
        };
        let updated = self.snap(self.smoothing * old + (1.0 - self.smoothing) * sample);
        self.coefficients.insert(objective.to_string(), updated);
        updated
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.coefficients.iter().map(|(k, &v)| (k.as_str(), v))
    }
}
