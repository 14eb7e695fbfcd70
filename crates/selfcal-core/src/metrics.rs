use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter values and objective criticalities after one cycle.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CycleSample {
    pub cycle: u64,
    pub parameters: BTreeMap<String, f64>,
    /// Objective and satisfaction criticalities, by agent name.
    pub criticalities: BTreeMap<String, f64>,
    pub total_abs_criticality: f64,
}

impl CycleSample {
    pub fn new(
        cycle: u64,
        parameters: BTreeMap<String, f64>,
        criticalities: BTreeMap<String, f64>,
    ) -> Self {
        let total_abs_criticality = criticalities.values().map(|c| c.abs()).sum();
        Self {
            cycle,
            parameters,
            criticalities,
            total_abs_criticality,
        }
    }

    /// Every objective sits inside its comfort band.
    pub fn is_satisfied(&self) -> bool {
        !self.criticalities.is_empty() && self.total_abs_criticality == 0.0
    }
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub steps: usize,
    pub sample_every: usize,
    pub samples: Vec<CycleSample>,
    /// First cycle at which every objective reported zero criticality.
    #[serde(default)]
    pub converged_at: Option<u64>,
}

impl RunSummary {
    pub fn final_sample(&self) -> Option<&CycleSample> {
        self.samples.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_totals_absolute_criticality() {
        let sample = CycleSample::new(
            3,
            BTreeMap::from([("p".to_string(), 1.0)]),
            BTreeMap::from([("a".to_string(), -0.5), ("b".to_string(), 0.25)]),
        );
        assert_eq!(sample.total_abs_criticality, 0.75);
        assert!(!sample.is_satisfied());
        assert!(!CycleSample::default().is_satisfied());
    }

    #[test]
    fn summary_without_schema_version_defaults_to_one() {
        let summary: RunSummary =
            serde_json::from_str(r#"{"steps": 2, "sample_every": 1, "samples": []}"#).unwrap();
        assert_eq!(summary.schema_version, 1);
        assert_eq!(summary.converged_at, None);
        assert!(summary.final_sample().is_none());
    }
}
