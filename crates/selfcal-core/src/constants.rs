/// Magnitude of the comfort curve outside `[inf, sup)`.
pub const SATURATION: f64 = 100.0;

/// Criticality reported by a continuous-optimization objective. It never reaches
/// zero, so parameters keep pushing on it every cycle.
pub const OPTIMIZATION_CRITICALITY: f64 = 1e-3;

/// Default capacity of an objective's criticality history (period detection window).
pub const HISTORY_CAPACITY: usize = 10;

/// Lower bound of the adaptive step, as a fraction of the parameter domain range.
pub const MIN_STEP_RATIO: f64 = 1e-5;

/// Upper bound of the adaptive step, as a fraction of the parameter domain range.
pub const MAX_STEP_RATIO: f64 = 1e-3;

/// Initial adaptive step for variation requests, in attribute units.
pub const REQUEST_INITIAL_STEP: f64 = 1.0;

/// Safety bound on measure forwarding rounds within one cycle. Sign-alternating
/// cycles in the correlation graph would otherwise never settle.
pub const MAX_PROPAGATION_ROUNDS: usize = 32;

/// Two criticality magnitudes closer than this are treated as a tie.
pub const TIE_TOLERANCE: f64 = 1e-12;
