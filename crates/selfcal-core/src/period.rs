use std::collections::VecDeque;

/// Smallest repeating period at the head of `values`, if any.
///
/// Looks for the smallest `p` with `2 <= p <= capacity / 2` such that the
/// first `p` values (oldest first) equal the next `p` values within
/// `tolerance` and are not all identical. Constant runs never count as a
/// cycle.
pub fn detect_period(values: &[f64], capacity: usize, tolerance: f64) -> Option<usize> {
    let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
    let max_period = (capacity / 2).min(values.len() / 2);
    (2..=max_period).find(|&p| {
        let head = &values[..p];
        let repeated = head
            .iter()
            .zip(&values[p..2 * p])
            .all(|(&a, &b)| close(a, b));
        let varied = head.iter().any(|&v| !close(v, head[0]));
        repeated && varied
    })
}

/// Bounded criticality history kept by each objective.
#[derive(Clone, Debug)]
pub struct CriticalityHistory {
    values: VecDeque<f64>,
    capacity: usize,
    tolerance: f64,
}

impl CriticalityHistory {
    pub fn new(capacity: usize, tolerance: f64) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            tolerance,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn detect_period(&mut self) -> Option<usize> {
        detect_period(self.values.make_contiguous(), self.capacity, self.tolerance)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}
