use serde::{Deserialize, Serialize};

/// Direction in which a parameter is asked to move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    #[default]
    Stay,
}

impl Direction {
    /// `Increase` and `Decrease` swap; `Stay` is its own opposite.
    pub fn opposite(self) -> Self {
        match self {
            Self::Increase => Self::Decrease,
            Self::Decrease => Self::Increase,
            Self::Stay => Self::Stay,
        }
    }

    /// `+1`, `-1` or `0`.
    pub fn sign(self) -> f64 {
        match self {
            Self::Increase => 1.0,
            Self::Decrease => -1.0,
            Self::Stay => 0.0,
        }
    }

    /// Direction carrying the sign of `value`. Zero and NaN map to `Stay`.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::Increase
        } else if value < 0.0 {
            Self::Decrease
        } else {
            Self::Stay
        }
    }

    pub fn is_stay(self) -> bool {
        self == Self::Stay
    }
}

/// Criticality of one objective, broadcast to every parameter agent each cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CriticalityMessage {
    pub objective: String,
    /// Normalized criticality, used to rank objectives.
    pub criticality: f64,
    /// Criticality before normalization. Influence is learned from its
    /// change, which a running-max normalizer would otherwise flatten.
    pub raw: f64,
}

/// Directional request emitted by a satisfaction agent and forwarded by measures.
#[derive(Clone, Debug, PartialEq)]
pub struct VariationRequest {
    /// Last agent that handled the request. Measures rewrite it when forwarding.
    pub sender_name: String,
    pub criticality: f64,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Criticality(CriticalityMessage),
    OscillationDetected { objective: String },
    VariationRequest(VariationRequest),
}

/// Private per-agent inbox. Messages live for a single cycle.
#[derive(Clone, Debug, Default)]
pub struct Mailbox {
    messages: Vec<Message>,
}

impl Mailbox {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Remove and return everything received so far.
    pub fn take(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn has_variation_requests(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, Message::VariationRequest(_)))
    }
}
