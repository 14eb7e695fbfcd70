use crate::message::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sign of a correlation edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    Positive,
    Negative,
}

impl Sign {
    /// `Some(Positive)` for `v > 0`, `Some(Negative)` for `v < 0`, else `None`.
    pub fn from_value(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(Self::Positive)
        } else if value < 0.0 {
            Some(Self::Negative)
        } else {
            None
        }
    }

    /// Direction a request takes after crossing an edge of this sign.
    pub fn apply(self, direction: Direction) -> Direction {
        match self {
            Self::Positive => direction,
            Self::Negative => direction.opposite(),
        }
    }
}

/// Static signed graph used to forward variation requests between measures
/// and parameters: `measure -> {neighbour -> sign}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationMatrix {
    rows: BTreeMap<String, BTreeMap<String, Sign>>,
}

impl CorrelationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the edge `measure -> neighbour`.
    pub fn link(
        &mut self,
        measure: impl Into<String>,
        neighbour: impl Into<String>,
        sign: Sign,
    ) -> &mut Self {
        self.rows
            .entry(measure.into())
            .or_default()
            .insert(neighbour.into(), sign);
        self
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Sign>)> {
        self.rows.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn row(&self, measure: &str) -> Option<&BTreeMap<String, Sign>> {
        self.rows.get(measure)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_edges_invert_direction() {
        assert_eq!(Sign::Negative.apply(Direction::Increase), Direction::Decrease);
        assert_eq!(Sign::Positive.apply(Direction::Decrease), Direction::Decrease);
        assert_eq!(Sign::Negative.apply(Direction::Stay), Direction::Stay);
    }

    #[test]
    fn sign_from_value() {
        assert_eq!(Sign::from_value(-1.0), Some(Sign::Negative));
        assert_eq!(Sign::from_value(0.0), None);
    }

    #[test]
    fn deserializes_from_nested_map() {
        let matrix: CorrelationMatrix =
            serde_json::from_str(r#"{"temperature": {"heater": "positive", "fan": "negative"}}"#)
                .unwrap();
        let row = matrix.row("temperature").unwrap();
        assert_eq!(row["fan"], Sign::Negative);
        let mut built = CorrelationMatrix::new();
        built
            .link("temperature", "heater", Sign::Positive)
            .link("temperature", "fan", Sign::Negative);
        assert_eq!(built, matrix);
    }
}
