// Ordered threshold rules. Predicates overlap, so the first match wins and the
// fallback label makes every rule set total. A vector with neither energy nor
// voiced pitch carries no prosody and always gets the fallback label.

use crate::emotion::{Emotion, EmotionClassifier};
use crate::features::FeatureVector;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy)]
pub struct Rule {
    pub label: Emotion,
    pub predicate: fn(&FeatureVector) -> bool,
}

impl Rule {
    pub const fn new(label: Emotion, predicate: fn(&FeatureVector) -> bool) -> Self {
        Self { label, predicate }
    }

    pub fn matches(&self, features: &FeatureVector) -> bool {
        (self.predicate)(features)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("label", &self.label).finish()
    }
}

/// Named rule sets shipped with the crate.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSetKind {
    /// Surprised / Calm / Neutral.
    #[default]
    Baseline,
    /// Excited / Calm / Surprised / Neutral / Friendly.
    Extended,
}

impl RuleSetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Extended => "extended",
        }
    }

    pub fn rule_set(&self) -> RuleSet {
        match self {
            Self::Baseline => RuleSet::baseline(),
            Self::Extended => RuleSet::extended(),
        }
    }
}

const BASELINE_RULES: &[Rule] = &[
    Rule::new(Emotion::Surprised, |f| {
        f.pitch_avg > 340.0 && f.pitch_std > 110.0 && f.speech_rate > 2.5
    }),
    Rule::new(Emotion::Calm, |f| {
        f.pitch_avg < 320.0 && f.pitch_std < 105.0 && f.speech_rate < 1.9 && f.energy < 0.085
    }),
];

const EXTENDED_RULES: &[Rule] = &[
    Rule::new(Emotion::Excited, |f| f.pitch_avg > 220.0 && f.speech_rate > 5.0),
    Rule::new(Emotion::Calm, |f| f.speech_rate < 3.5 && f.pitch_avg < 200.0),
    Rule::new(Emotion::Surprised, |f| f.pitch_std > 30.0),
    Rule::new(Emotion::Neutral, |f| f.pitch_avg < 190.0 && f.energy < 0.02),
];

#[derive(Clone, Debug)]
pub struct RuleSet {
    kind: RuleSetKind,
    rules: &'static [Rule],
    fallback: Emotion,
}

impl RuleSet {
    pub fn baseline() -> Self {
        Self {
            kind: RuleSetKind::Baseline,
            rules: BASELINE_RULES,
            fallback: Emotion::Neutral,
        }
    }

    pub fn extended() -> Self {
        Self {
            kind: RuleSetKind::Extended,
            rules: EXTENDED_RULES,
            fallback: Emotion::Friendly,
        }
    }

    pub fn kind(&self) -> RuleSetKind {
        self.kind
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules
    }

    pub fn fallback(&self) -> Emotion {
        self.fallback
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSetKind::default().rule_set()
    }
}

fn is_silent(features: &FeatureVector) -> bool {
    features.energy <= 0.0 && features.pitch_avg <= 0.0
}

impl EmotionClassifier for RuleSet {
    fn classify(&self, features: &FeatureVector) -> Emotion {
        if is_silent(features) {
            return self.fallback;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(features))
            .map_or(self.fallback, |rule| rule.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(pitch_avg: f64, pitch_std: f64, speech_rate: f64, energy: f64) -> FeatureVector {
        FeatureVector::new(pitch_avg, pitch_std, speech_rate, energy)
    }

    #[test]
    fn baseline_examples() {
        let rules = RuleSet::baseline();
        assert_eq!(rules.classify(&fv(350.0, 120.0, 3.0, 0.05)), Emotion::Surprised);
        assert_eq!(rules.classify(&fv(300.0, 90.0, 1.5, 0.05)), Emotion::Calm);
        assert_eq!(rules.classify(&fv(330.0, 90.0, 2.0, 0.05)), Emotion::Neutral);
    }

    #[test]
    fn baseline_thresholds_are_strict() {
        let rules = RuleSet::baseline();
        assert_eq!(rules.classify(&fv(340.0, 120.0, 3.0, 0.05)), Emotion::Neutral);
        assert_eq!(rules.classify(&fv(300.0, 90.0, 1.5, 0.085)), Emotion::Neutral);
    }

    #[test]
    fn silent_vector_gets_fallback_label() {
        assert_eq!(RuleSet::baseline().classify(&FeatureVector::ZERO), Emotion::Neutral);
        assert_eq!(RuleSet::extended().classify(&FeatureVector::ZERO), Emotion::Friendly);
    }

    #[test]
    fn quiet_unvoiced_audio_is_still_classified() {
        // Energy without voiced pitch goes through the rules.
        let f = fv(0.0, 0.0, 1.0, 0.01);
        assert_eq!(RuleSet::baseline().classify(&f), Emotion::Calm);
        assert_eq!(RuleSet::extended().classify(&f), Emotion::Calm);
    }

    #[test]
    fn extended_examples() {
        let rules = RuleSet::extended();
        assert_eq!(rules.classify(&fv(250.0, 10.0, 6.0, 0.1)), Emotion::Excited);
        assert_eq!(rules.classify(&fv(180.0, 10.0, 2.0, 0.1)), Emotion::Calm);
        assert_eq!(rules.classify(&fv(210.0, 40.0, 4.0, 0.1)), Emotion::Surprised);
        assert_eq!(rules.classify(&fv(185.0, 10.0, 4.0, 0.01)), Emotion::Neutral);
        assert_eq!(rules.classify(&fv(210.0, 10.0, 4.0, 0.1)), Emotion::Friendly);
    }

    #[test]
    fn earlier_rule_wins_when_several_match() {
        // Satisfies both Excited (1st) and Surprised (3rd).
        let both = fv(260.0, 45.0, 6.0, 0.1);
        assert!(EXTENDED_RULES[0].matches(&both));
        assert!(EXTENDED_RULES[2].matches(&both));
        assert_eq!(RuleSet::extended().classify(&both), Emotion::Excited);

        // Satisfies both Calm (2nd) and Neutral (4th).
        let quiet = fv(150.0, 5.0, 1.0, 0.01);
        assert!(EXTENDED_RULES[1].matches(&quiet));
        assert!(EXTENDED_RULES[3].matches(&quiet));
        assert_eq!(RuleSet::extended().classify(&quiet), Emotion::Calm);
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = RuleSet::default();
        let f = fv(345.5, 111.0, 2.6, 0.2);
        let first = rules.classify(&f);
        for _ in 0..100 {
            assert_eq!(rules.classify(&f), first);
        }
    }

    #[test]
    fn kind_round_trips_to_rule_set() {
        assert_eq!(RuleSetKind::Extended.rule_set().kind(), RuleSetKind::Extended);
        assert_eq!(RuleSet::default().kind(), RuleSetKind::Baseline);
        assert_eq!(RuleSet::extended().fallback(), Emotion::Friendly);
    }
}
