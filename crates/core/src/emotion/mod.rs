mod rules;

use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use rules::{Rule, RuleSet, RuleSetKind};

/// Coarse emotion label. Which labels can occur depends on the active [`RuleSet`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Emotion {
    Surprised,
    Calm,
    Neutral,
    Excited,
    Friendly,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Surprised => "Surprised",
            Self::Calm => "Calm",
            Self::Neutral => "Neutral",
            Self::Excited => "Excited",
            Self::Friendly => "Friendly",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a feature vector to a label. Must be pure and total.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, features: &FeatureVector) -> Emotion;
}
