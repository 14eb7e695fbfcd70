//! K-nearest-neighbour case memory used by the case-memory decision strategy.

use crate::agent::{AgentId, AgentKind, SituationAgent};
use crate::message::Direction;

/// Every situation recorded so far, plus the neighbours selected for the
/// cycle in progress.
#[derive(Clone, Debug)]
pub struct CaseMemory {
    k: usize,
    candidate_factor: usize,
    exact_match_threshold: f64,
    situations: Vec<SituationAgent>,
    neighbours: Vec<usize>,
}

impl CaseMemory {
    pub fn new(k: usize, candidate_factor: usize, exact_match_threshold: f64) -> Self {
        Self {
            k,
            candidate_factor,
            exact_match_threshold,
            situations: Vec::new(),
            neighbours: Vec::new(),
        }
    }

    pub fn situations(&self) -> &[SituationAgent] {
        &self.situations
    }

    pub fn len(&self) -> usize {
        self.situations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.situations.is_empty()
    }

    /// Situations selected for the current cycle.
    pub fn neighbours(&self) -> impl Iterator<Item = &SituationAgent> {
        self.neighbours.iter().map(|&i| &self.situations[i])
    }

    /// Attach objective variations to the most recent situation if it is
    /// still waiting for its outcome.
    pub(crate) fn record_outcome(&mut self, variations: Vec<f64>) {
        if let Some(last) = self.situations.last_mut().filter(|s| !s.is_complete()) {
            last.set_outcome(variations);
        }
    }

    /// Select neighbours for the current state, then record it as a new
    /// situation.
    pub(crate) fn open(&mut self, cycle: u64, state: Vec<f64>, parameters: Vec<f64>) -> AgentId {
        self.neighbours = self.select(&state, &parameters);
        let id = AgentId::new(AgentKind::Situation, self.situations.len());
        self.situations
            .push(SituationAgent::new(id, cycle, state, parameters));
        id
    }

    pub(crate) fn record_actions(&mut self, actions: Vec<Direction>) {
        if let Some(last) = self.situations.last_mut() {
            last.set_actions(actions);
        }
    }

    /// Indices of the stored situations closest to `(state, parameters)`.
    ///
    /// Only situations with a known outcome take part. If exactly one of them
    /// lies within the exact-match threshold on both distances it is returned
    /// alone. Otherwise the `candidate_factor * k` closest by state distance
    /// are kept, and of those the `k` closest by parameter distance.
    pub fn select(&self, state: &[f64], parameters: &[f64]) -> Vec<usize> {
        let complete: Vec<usize> = (0..self.situations.len())
            .filter(|&i| self.situations[i].is_complete())
            .collect();
        if complete.is_empty() {
            return Vec::new();
        }
        let state_rows: Vec<&[f64]> = complete.iter().map(|&i| self.situations[i].state()).collect();
        let parameter_rows: Vec<&[f64]> = complete
            .iter()
            .map(|&i| self.situations[i].parameters())
            .collect();
        let state_distance = normalized_distances(state, &state_rows);
        let parameter_distance = normalized_distances(parameters, &parameter_rows);

        let exact: Vec<usize> = (0..complete.len())
            .filter(|&j| {
                state_distance[j] <= self.exact_match_threshold
                    && parameter_distance[j] <= self.exact_match_threshold
            })
            .collect();
        if let [only] = exact.as_slice() {
            return vec![complete[*only]];
        }

        let by_state = nearest(
            state_distance.iter().copied().enumerate(),
            self.candidate_factor.saturating_mul(self.k),
        );
        let by_parameters = nearest(
            by_state.iter().map(|&(j, _)| (j, parameter_distance[j])),
            self.k,
        );
        by_parameters.into_iter().map(|(j, _)| complete[j]).collect()
    }

    /// Direction the current neighbours recommend for `parameter`: the one
    /// whose cases reduced total criticality the most on average. `None`
    /// when no direction improved things or the two are tied.
    pub fn vote(&self, parameter: usize) -> Option<Direction> {
        let mut increase = (0.0, 0usize);
        let mut decrease = (0.0, 0usize);
        for situation in self.neighbours() {
            let Some(total) = situation.outcome_total() else {
                continue;
            };
            match situation.actions().get(parameter) {
                Some(Direction::Increase) => {
                    increase.0 += total;
                    increase.1 += 1;
                }
                Some(Direction::Decrease) => {
                    decrease.0 += total;
                    decrease.1 += 1;
                }
                _ => {}
            }
        }
        let mean = |(sum, count): (f64, usize)| (count > 0).then(|| sum / count as f64);
        let best = match (mean(increase), mean(decrease)) {
            (Some(up), Some(down)) if up < down => Some((Direction::Increase, up)),
            (Some(up), Some(down)) if down < up => Some((Direction::Decrease, down)),
            (Some(_), Some(_)) => None,
            (Some(up), None) => Some((Direction::Increase, up)),
            (None, Some(down)) => Some((Direction::Decrease, down)),
            (None, None) => None,
        };
        best.filter(|&(_, score)| score < 0.0).map(|(direction, _)| direction)
    }
}

/// Squared Euclidean distance from `query` to every row, each dimension
/// scaled by its min/max span over the rows and the query. Flat dimensions
/// contribute nothing.
fn normalized_distances(query: &[f64], rows: &[&[f64]]) -> Vec<f64> {
    let mut low = query.to_vec();
    let mut high = query.to_vec();
    for row in rows {
        for (j, &v) in row.iter().enumerate().take(query.len()) {
            low[j] = low[j].min(v);
            high[j] = high[j].max(v);
        }
    }
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(query)
                .enumerate()
                .map(|(j, (&a, &b))| {
                    let span = high[j] - low[j];
                    if span > 0.0 {
                        ((a - b) / span).powi(2)
                    } else {
                        0.0
                    }
                })
                .sum()
        })
        .collect()
}

/// Keep the `limit` closest `(index, distance)` pairs.
///
/// When the selection is full, a closer candidate replaces the farthest kept
/// one; among equally far ones the first encountered is evicted, so the
/// result depends on iteration order when distances tie.
fn nearest(candidates: impl IntoIterator<Item = (usize, f64)>, limit: usize) -> Vec<(usize, f64)> {
    let mut kept: Vec<(usize, f64)> = Vec::with_capacity(limit);
    for (index, distance) in candidates {
        if kept.len() < limit {
            kept.push((index, distance));
            continue;
        }
        let Some(farthest) = farthest_position(&kept) else {
            continue;
        };
        if distance < kept[farthest].1 {
            kept[farthest] = (index, distance);
        }
    }
    kept
}

fn farthest_position(kept: &[(usize, f64)]) -> Option<usize> {
    let mut farthest: Option<usize> = None;
    for (position, &(_, distance)) in kept.iter().enumerate() {
        match farthest {
            Some(current) if kept[current].1 >= distance => {}
            _ => farthest = Some(position),
        }
    }
    farthest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remember(memory: &mut CaseMemory, state: f64, parameter: f64, action: Direction, outcome: f64) {
        memory.open(memory.len() as u64, vec![state], vec![parameter]);
        memory.record_actions(vec![action]);
        memory.record_outcome(vec![outcome]);
    }

    #[test]
    fn eviction_replaces_first_encountered_farthest() {
        let kept = nearest([(0, 1.0), (1, 3.0), (2, 3.0), (3, 2.0)], 3);
        assert_eq!(kept, vec![(0, 1.0), (3, 2.0), (2, 3.0)]);
        assert!(nearest([(0, 1.0)], 0).is_empty());
    }

    #[test]
    fn distances_are_scaled_per_dimension() {
        let rows: [&[f64]; 2] = [&[0.0, 100.0], &[10.0, 0.0]];
        let d = normalized_distances(&[0.0, 0.0], &rows);
        assert_eq!(d, vec![1.0, 1.0]);
        let flat: [&[f64]; 1] = [&[5.0]];
        assert_eq!(normalized_distances(&[5.0], &flat), vec![0.0]);
    }

    #[test]
    fn second_stage_prefers_parameter_similarity() {
        let mut memory = CaseMemory::new(1, 2, 0.0);
        remember(&mut memory, 0.0, 10.0, Direction::Increase, -1.0);
        remember(&mut memory, 1.0, 0.0, Direction::Increase, -1.0);
        remember(&mut memory, 9.0, 0.0, Direction::Increase, -1.0);
        assert_eq!(memory.select(&[0.0], &[0.0]), vec![1]);
    }

    #[test]
    fn single_exact_match_short_circuits() {
        let mut memory = CaseMemory::new(3, 2, 1e-9);
        remember(&mut memory, 0.0, 0.0, Direction::Increase, -1.0);
        remember(&mut memory, 5.0, 5.0, Direction::Decrease, -1.0);
        remember(&mut memory, 6.0, 6.0, Direction::Decrease, -1.0);
        assert_eq!(memory.select(&[5.0], &[5.0]), vec![1]);
    }

    #[test]
    fn open_situations_are_not_candidates() {
        let mut memory = CaseMemory::new(2, 2, 0.0);
        memory.open(1, vec![0.0], vec![0.0]);
        assert!(memory.select(&[0.0], &[0.0]).is_empty());
        memory.record_outcome(vec![0.5]);
        assert_eq!(memory.select(&[0.0], &[0.0]), vec![0]);
    }

    #[test]
    fn vote_follows_the_improving_direction() {
        let mut memory = CaseMemory::new(4, 2, 0.0);
        remember(&mut memory, 0.0, 0.0, Direction::Increase, -0.4);
        remember(&mut memory, 0.1, 0.1, Direction::Decrease, 0.3);
        remember(&mut memory, 0.2, 0.2, Direction::Increase, -0.2);
        memory.open(4, vec![0.05], vec![0.05]);
        assert_eq!(memory.neighbours().count(), 3);
        assert_eq!(memory.vote(0), Some(Direction::Increase));
        assert_eq!(memory.vote(1), None);
    }

    #[test]
    fn vote_abstains_when_nothing_improved() {
        let mut memory = CaseMemory::new(4, 2, 0.0);
        remember(&mut memory, 0.0, 0.0, Direction::Increase, 0.4);
        remember(&mut memory, 0.1, 0.1, Direction::Decrease, 0.1);
        memory.open(3, vec![0.05], vec![0.05]);
        assert_eq!(memory.vote(0), None);
    }

    #[test]
    fn situations_get_dense_ids() {
        let mut memory = CaseMemory::new(1, 1, 0.0);
        remember(&mut memory, 0.0, 0.0, Direction::Stay, 0.0);
        let id = memory.open(2, vec![1.0], vec![1.0]);
        assert_eq!(id, AgentId::new(AgentKind::Situation, 1));
        assert_eq!(memory.situations()[1].name(), "situation-1");
        assert!(!memory.situations()[1].is_complete());
    }
}
