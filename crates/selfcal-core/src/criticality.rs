//! Criticality evaluation: the six-threshold comfort curve and the
//! name-checked criticality functions objectives are built from.

use crate::constants::{OPTIMIZATION_CRITICALITY, SATURATION};
use crate::error::EngineError;
use crate::message::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Named input values handed to a [`CriticalityFunction`].
pub type Values = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("criticality thresholds must be finite")]
    NonFinite,
    #[error(
        "criticality thresholds must satisfy inf < infl1 <= null_min <= null_max < infl2 < sup, got ({inf}, {infl1}, {null_min}, {null_max}, {infl2}, {sup})"
    )]
    OutOfOrder {
        inf: f64,
        infl1: f64,
        null_min: f64,
        null_max: f64,
        infl2: f64,
        sup: f64,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct ThresholdsRepr {
    inf: f64,
    infl1: f64,
    null_min: f64,
    null_max: f64,
    infl2: f64,
    sup: f64,
}

/// Thresholds of the comfort curve, validated at construction.
///
/// `inf < infl1 <= null_min <= null_max < infl2 < sup`. The curve saturates
/// outside `[inf, sup)`, is zero on `[null_min, null_max]`, and each flank is
/// made of two quadratics joined with matching slope at `infl1` / `infl2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdsRepr", into = "ThresholdsRepr")]
pub struct CriticalityFunctionParameters {
    inf: f64,
    infl1: f64,
    null_min: f64,
    null_max: f64,
    infl2: f64,
    sup: f64,
}

impl TryFrom<ThresholdsRepr> for CriticalityFunctionParameters {
    type Error = ThresholdError;

    fn try_from(r: ThresholdsRepr) -> Result<Self, Self::Error> {
        Self::new(r.inf, r.infl1, r.null_min, r.null_max, r.infl2, r.sup)
    }
}

impl From<CriticalityFunctionParameters> for ThresholdsRepr {
    fn from(p: CriticalityFunctionParameters) -> Self {
        Self {
            inf: p.inf,
            infl1: p.infl1,
            null_min: p.null_min,
            null_max: p.null_max,
            infl2: p.infl2,
            sup: p.sup,
        }
    }
}

/// One quadratic flank piece: slope `g` at `dx = 0`, zero slope at `dx = -span`.
fn flank(g: f64, dx: f64, span: f64) -> f64 {
    g * dx * dx / (2.0 * span) + g * dx
}

impl CriticalityFunctionParameters {
    pub fn new(
        inf: f64,
        infl1: f64,
        null_min: f64,
        null_max: f64,
        infl2: f64,
        sup: f64,
    ) -> Result<Self, ThresholdError> {
        let all = [inf, infl1, null_min, null_max, infl2, sup];
        if !all.iter().all(|t| t.is_finite()) {
            return Err(ThresholdError::NonFinite);
        }
        let ordered =
            inf < infl1 && infl1 <= null_min && null_min <= null_max && null_max < infl2 && infl2 < sup;
        if !ordered {
            return Err(ThresholdError::OutOfOrder {
                inf,
                infl1,
                null_min,
                null_max,
                infl2,
                sup,
            });
        }
        Ok(Self {
            inf,
            infl1,
            null_min,
            null_max,
            infl2,
            sup,
        })
    }

    pub fn inf(&self) -> f64 {
        self.inf
    }
    pub fn infl1(&self) -> f64 {
        self.infl1
    }
    pub fn null_min(&self) -> f64 {
        self.null_min
    }
    pub fn null_max(&self) -> f64 {
        self.null_max
    }
    pub fn infl2(&self) -> f64 {
        self.infl2
    }
    pub fn sup(&self) -> f64 {
        self.sup
    }

    /// Comfort criticality of `x`, in `[-SATURATION, SATURATION]`.
    ///
    /// Positive below the comfort band, negative above it. The span
    /// `null_min - infl1` may be zero; its branch is then empty and never taken.
    pub fn comfort(&self, x: f64) -> f64 {
        if x < self.inf {
            return SATURATION;
        }
        if x >= self.sup {
            return -SATURATION;
        }
        if (self.null_min..=self.null_max).contains(&x) {
            return 0.0;
        }
        let g1 = -2.0 * SATURATION / (self.null_min - self.inf);
        let g2 = -2.0 * SATURATION / (self.sup - self.null_max);
        let d1 = -g1 * (self.null_min - self.infl1) / 2.0;
        let d2 = -g2 * (self.infl2 - self.null_max) / 2.0;

        if x < self.infl1 {
            flank(g1, x - self.infl1, self.infl1 - self.inf) + d1
        } else if x < self.null_min {
            flank(g1, x - self.infl1, -(self.null_min - self.infl1)) + d1
        } else if x <= self.infl2 {
            flank(g2, x - self.infl2, self.infl2 - self.null_max) - d2
        } else {
            flank(g2, x - self.infl2, -(self.sup - self.infl2)) - d2
        }
    }

    /// Direction that brings `x` back into the comfort band.
    pub fn direction_for(&self, x: f64) -> Direction {
        if x < self.null_min {
            Direction::Increase
        } else if x > self.null_max {
            Direction::Decrease
        } else {
            Direction::Stay
        }
    }
}

type Expression = Box<dyn Fn(&Values) -> f64>;

enum Evaluator {
    Expression(Expression),
    Comfort {
        input: String,
        parameters: CriticalityFunctionParameters,
    },
    ContinuousOptimization,
}

/// Pure function from named inputs to a raw criticality.
///
/// The supplied key set must match the declared input set exactly; anything
/// else is a wiring bug and is reported as
/// [`EngineError::CriticalityInputMismatch`].
pub struct CriticalityFunction {
    inputs: BTreeSet<String>,
    evaluator: Evaluator,
}

impl CriticalityFunction {
    pub fn new<I, S, F>(inputs: I, expression: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Values) -> f64 + 'static,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            evaluator: Evaluator::Expression(Box::new(expression)),
        }
    }

    /// The comfort curve applied to a single input.
    pub fn comfort(input: impl Into<String>, parameters: CriticalityFunctionParameters) -> Self {
        let input = input.into();
        Self {
            inputs: BTreeSet::from([input.clone()]),
            evaluator: Evaluator::Comfort { input, parameters },
        }
    }

    /// Objective without a target band: always slightly critical.
    pub fn continuous_optimization<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            evaluator: Evaluator::ContinuousOptimization,
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str)
    }

    pub fn evaluate(&self, values: &Values) -> Result<f64, EngineError> {
        let matches =
            values.len() == self.inputs.len() && values.keys().all(|k| self.inputs.contains(k));
        if !matches {
            return Err(EngineError::CriticalityInputMismatch {
                expected: self.inputs.iter().cloned().collect(),
                actual: values.keys().cloned().collect(),
            });
        }
        Ok(match &self.evaluator {
            Evaluator::Expression(f) => f(values),
            Evaluator::Comfort { input, parameters } => parameters.comfort(values[input]),
            Evaluator::ContinuousOptimization => OPTIMIZATION_CRITICALITY,
        })
    }
}

impl fmt::Debug for CriticalityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.evaluator {
            Evaluator::Expression(_) => "expression",
            Evaluator::Comfort { .. } => "comfort",
            Evaluator::ContinuousOptimization => "continuous_optimization",
        };
        f.debug_struct("CriticalityFunction")
            .field("inputs", &self.inputs)
            .field("kind", &kind)
            .finish()
    }
}
