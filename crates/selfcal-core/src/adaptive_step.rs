use crate::message::Direction;

/// Adaptive value tracker (AVT) for one parameter.
///
/// The step doubles while the parameter keeps moving the same way and shrinks
/// to a third on every reversal, always staying inside `[min, max]`.
#[derive(Clone, Debug)]
pub struct AdaptiveStep {
    delta: f64,
    min: f64,
    max: f64,
    last_direction: Direction,
}

impl AdaptiveStep {
    pub fn new(initial: f64, min: f64, max: f64) -> Self {
        let max = max.max(min);
        Self {
            delta: bounded(initial, min, max),
            min,
            max,
            last_direction: Direction::Stay,
        }
    }

    /// Bounds expressed as fractions of a domain range.
    pub fn relative(range: f64, initial_ratio: f64, min_ratio: f64, max_ratio: f64) -> Self {
        Self::new(initial_ratio * range, min_ratio * range, max_ratio * range)
    }

    /// Step to apply for a move in `direction`. `Stay` returns 0 and leaves
    /// the tracker untouched; the first move uses the initial step as is.
    pub fn next(&mut self, direction: Direction) -> f64 {
        if direction.is_stay() {
            return 0.0;
        }
        if !self.last_direction.is_stay() {
            let factor = if direction == self.last_direction {
                2.0
            } else {
                1.0 / 3.0
            };
            self.delta = bounded(self.delta * factor, self.min, self.max);
        }
        self.last_direction = direction;
        self.delta
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Last non-`Stay` direction moved in.
    pub fn last_direction(&self) -> Direction {
        self.last_direction
    }
}

fn bounded(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_move_uses_initial_step() {
        let mut step = AdaptiveStep::new(1.0, 0.01, 10.0);
        assert_eq!(step.next(Direction::Increase), 1.0);
    }

    #[test]
    fn repeated_direction_doubles_and_reversal_divides_by_three() {
        let mut step = AdaptiveStep::new(0.3, 0.01, 10.0);
        step.next(Direction::Increase);
        assert_eq!(step.next(Direction::Increase), 0.6);
        assert!((step.next(Direction::Decrease) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn stay_is_free_and_does_not_reset_history() {
        let mut step = AdaptiveStep::new(1.0, 0.01, 10.0);
        step.next(Direction::Decrease);
        assert_eq!(step.next(Direction::Stay), 0.0);
        assert_eq!(step.last_direction(), Direction::Decrease);
        assert_eq!(step.next(Direction::Decrease), 2.0);
    }

    #[test]
    fn step_is_clamped_to_bounds() {
        let mut step = AdaptiveStep::relative(10.0, 1e-3, 1e-5, 1e-3);
        let max = step.delta();
        assert!((max - 0.01).abs() < 1e-15);
        step.next(Direction::Increase);
        assert_eq!(step.next(Direction::Increase), max);
        for _ in 0..40 {
            step.next(Direction::Increase);
            step.next(Direction::Decrease);
        }
        assert!(step.delta() >= 1e-4 - 1e-15);
        assert!(step.delta() <= max);
    }
}
