//! Turns raw classifier output from any channel into one canonical
//! [`EscalationSignal`].

use std::collections::{BTreeSet, HashSet};

use crabdesk_schema::{Channel, EscalationSignal};

use crate::config::{ConfigError, EscalationConfig};

pub struct SignalNormalizer {
    /// Escalation and legal vocabularies combined, lowercased. Legal
    /// matches must survive normalization so the evaluator can see them.
    vocabulary: HashSet<String>,
    cancellation_labels: HashSet<String>,
}

fn clamp_score(value: f32, min: f32, max: f32) -> f32 {
    // External classifiers are assumed noisy; out-of-range and non-finite
    // scores are coerced, never rejected.
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(min, max)
}

impl SignalNormalizer {
    pub fn new(config: &EscalationConfig) -> Result<Self, ConfigError> {
        if config.keywords.is_empty() {
            return Err(ConfigError::EmptyEscalationVocabulary);
        }
        if config.cancellation_labels.is_empty() {
            return Err(ConfigError::EmptyCancellationLabels);
        }

        let vocabulary = config
            .keywords
            .iter()
            .chain(config.legal_keywords.iter())
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let cancellation_labels = config
            .cancellation_labels
            .iter()
            .map(|l| l.trim().to_lowercase())
            .collect();

        Ok(Self {
            vocabulary,
            cancellation_labels,
        })
    }

    pub fn normalize(
        &self,
        raw_intent: &str,
        confidence: f32,
        sentiment: f32,
        raw_keywords: &[String],
        channel: Channel,
        source_ref: impl Into<String>,
    ) -> EscalationSignal {
        let matched_keywords: BTreeSet<String> = raw_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| self.vocabulary.contains(k))
            .collect();

        EscalationSignal {
            confidence: clamp_score(confidence, 0.0, 1.0),
            sentiment: clamp_score(sentiment, -1.0, 1.0),
            matched_keywords,
            is_cancellation_intent: self
                .cancellation_labels
                .contains(&raw_intent.trim().to_lowercase()),
            channel,
            source_ref: source_ref.into(),
        }
    }
}
