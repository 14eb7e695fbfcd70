use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which normalizer objectives use to scale raw criticality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizerKind {
    #[default]
    AllTimeMaxAbs,
    SlidingWindowMaxAbs {
        window: usize,
    },
}

impl NormalizerKind {
    pub fn build(&self) -> Normalizer {
        match self {
            Self::AllTimeMaxAbs => Normalizer::AllTime(AllTimeMaxAbs::default()),
            Self::SlidingWindowMaxAbs { window } => {
                Normalizer::SlidingWindow(SlidingWindowMaxAbs::new(*window))
            }
        }
    }
}

/// Divides by the largest magnitude ever observed.
#[derive(Clone, Debug, Default)]
pub struct AllTimeMaxAbs {
    max: f64,
}

impl AllTimeMaxAbs {
    pub fn normalize(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return raw;
        }
        self.max = self.max.max(raw.abs());
        scale(raw, self.max)
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Divides by the largest magnitude among the last `window` raw values.
#[derive(Clone, Debug)]
pub struct SlidingWindowMaxAbs {
    recent: VecDeque<f64>,
    window: usize,
}

impl SlidingWindowMaxAbs {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            recent: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn normalize(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return raw;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(raw.abs());
        scale(raw, self.max())
    }

    pub fn max(&self) -> f64 {
        self.recent.iter().copied().fold(0.0, f64::max)
    }
}

// A zero reference means nothing has been seen yet: pass the value through.
fn scale(raw: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        raw
    } else {
        raw / reference
    }
}

/// Stateful `raw -> [-1, 1]` transform owned by one objective.
#[derive(Clone, Debug)]
pub enum Normalizer {
    AllTime(AllTimeMaxAbs),
    SlidingWindow(SlidingWindowMaxAbs),
}

impl Normalizer {
    pub fn normalize(&mut self, raw: f64) -> f64 {
        match self {
            Self::AllTime(n) => n.normalize(raw),
            Self::SlidingWindow(n) => n.normalize(raw),
        }
    }

    /// Current reference magnitude.
    pub fn reference(&self) -> f64 {
        match self {
            Self::AllTime(n) => n.max(),
            Self::SlidingWindow(n) => n.max(),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        NormalizerKind::default().build()
    }
}
