use super::super::{StepReport, World};
use tracing::{debug, warn};

impl World {
    /// Relay variation requests through the measure graph until no measure
    /// holds one. Each round forwards whatever measures received in the
    /// previous round; a cyclic graph is cut after `max_propagation_rounds`.
    pub(in crate::world) fn step_propagation_phase(&mut self, report: &mut StepReport) {
        let limit = self.runtime.config.max_propagation_rounds;
        let mut rounds = 0;
        loop {
            let pending: Vec<usize> = self
                .agents
                .measures
                .iter()
                .enumerate()
                .filter(|(_, measure)| measure.has_pending_requests())
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                break;
            }
            if rounds >= limit {
                let dropped: usize = pending
                    .into_iter()
                    .map(|i| self.agents.measures[i].discard_pending())
                    .sum();
                warn!(rounds, dropped, "variation requests still circulating, dropping them");
                break;
            }
            rounds += 1;
            let mut forwarded = 0;
            for i in pending {
                forwarded += self.agents.measures[i].forward_requests(&mut self.runtime.outbox);
            }
            self.agents.deliver(&mut self.runtime.outbox);
            report.forwarded_requests += forwarded;
            if forwarded == 0 {
                break;
            }
        }
        if rounds > 0 {
            debug!(rounds, forwarded = report.forwarded_requests, "propagation settled");
        }
        report.propagation_rounds = rounds;
    }
}
