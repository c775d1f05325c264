//! Scoring engine
//!
//! Each [`SignalExtractor`] maps one raw attribute onto 0..=100 with a
//! fixed, documented function:
//! - rating: `(rating - 1) / 4 * 100`
//! - review volume: `min(log10(count + 1) * k, 100)`
//! - business age: logistic curve `100 / (1 + e^(-s * (years - midpoint)))`
//! - web presence: website 50, email 20, phone 15, social 15
//! - team size: `log10(n + 1) / log10(saturation + 1) * 100`
//! - registration: registered 100, explicitly unregistered 0
//!
//! Extractors fail independently. The weight of a signal that cannot be
//! computed is redistributed proportionally over the remaining ones, and
//! scoring only fails when nothing is computable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use radar_core::{
    attr, business_age_years, AttrValue, ExtractedAttributes, Profile, ScoringError, ScoringSignal,
    MAX_QUALITY_SCORE, MAX_SIGNAL_VALUE, MIN_QUALITY_SCORE,
};

/// Per-signal weights; they need not sum to one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub rating: f64,
    pub review_volume: f64,
    pub business_age: f64,
    pub web_presence: f64,
    pub team_size: f64,
    pub registration: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            rating: 0.30,
            review_volume: 0.20,
            business_age: 0.20,
            web_presence: 0.10,
            team_size: 0.10,
            registration: 0.10,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SignalWeights,
    /// Multiplier `k` of the review volume curve
    pub review_volume_k: f64,
    /// Business age at which the age signal reaches 50
    pub age_midpoint_years: f64,
    /// Steepness of the age curve
    pub age_steepness: f64,
    /// Team size at which the team signal reaches 100
    pub team_size_saturation: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            review_volume_k: 40.0,
            age_midpoint_years: 5.0,
            age_steepness: 0.8,
            team_size_saturation: 50.0,
        }
    }
}

/// What extractors read from
#[derive(Debug, Clone)]
pub struct SignalInputs {
    pub attributes: ExtractedAttributes,
    /// Reference time for age computations
    pub as_of: DateTime<Utc>,
}

impl SignalInputs {
    pub fn new(attributes: ExtractedAttributes, as_of: DateTime<Utc>) -> Self {
        Self { attributes, as_of }
    }

    pub fn from_profile(profile: &Profile, as_of: DateTime<Utc>) -> Self {
        Self::new(profile.attribute_values(), as_of)
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(AttrValue::as_f64)
    }

    fn present(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|v| match v {
            AttrValue::Text(s) => !s.trim().is_empty(),
            AttrValue::List(items) => !items.is_empty(),
            AttrValue::Flag(b) => *b,
            AttrValue::Number(_) => true,
        })
    }
}

/// A signal that could not be computed
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{signal}: {reason}")]
pub struct SignalGap {
    pub signal: String,
    pub reason: String,
}

impl SignalGap {
    fn missing(signal: &str, attribute: &str) -> Self {
        Self {
            signal: signal.to_string(),
            reason: format!("no {}", attribute),
        }
    }

    fn invalid(signal: &str, reason: impl Into<String>) -> Self {
        Self {
            signal: signal.to_string(),
            reason: reason.into(),
        }
    }
}

/// One independently failable signal
pub trait SignalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn weight(&self) -> f64;

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap>;
}

pub struct RatingSignal {
    pub weight: f64,
}

impl SignalExtractor for RatingSignal {
    fn name(&self) -> &'static str {
        "rating"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let rating = inputs
            .number(attr::RATING)
            .ok_or_else(|| SignalGap::missing(self.name(), attr::RATING))?;
        let normalized = (rating - 1.0) / 4.0 * 100.0;
        Ok(ScoringSignal::new(self.name(), rating, normalized, self.weight))
    }
}

pub struct ReviewVolumeSignal {
    pub weight: f64,
    pub k: f64,
}

impl SignalExtractor for ReviewVolumeSignal {
    fn name(&self) -> &'static str {
        "review_volume"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let count = inputs
            .number(attr::REVIEW_COUNT)
            .filter(|c| *c >= 0.0)
            .ok_or_else(|| SignalGap::missing(self.name(), attr::REVIEW_COUNT))?;
        let normalized = ((count + 1.0).log10() * self.k).min(MAX_SIGNAL_VALUE);
        Ok(ScoringSignal::new(self.name(), count, normalized, self.weight))
    }
}

pub struct BusinessAgeSignal {
    pub weight: f64,
    pub midpoint_years: f64,
    pub steepness: f64,
}

impl SignalExtractor for BusinessAgeSignal {
    fn name(&self) -> &'static str {
        "business_age"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let years = business_age_years(&inputs.attributes, inputs.as_of).ok_or_else(|| SignalGap {
            signal: self.name().to_string(),
            reason: "no founding year, experience or registration date".to_string(),
        })?;
        let normalized =
            MAX_SIGNAL_VALUE / (1.0 + (-self.steepness * (years - self.midpoint_years)).exp());
        Ok(ScoringSignal::new(self.name(), years, normalized, self.weight))
    }
}

pub struct WebPresenceSignal {
    pub weight: f64,
}

impl SignalExtractor for WebPresenceSignal {
    fn name(&self) -> &'static str {
        "web_presence"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let channels = [
            (attr::WEBSITE, 50.0),
            (attr::EMAIL, 20.0),
            (attr::PHONE, 15.0),
            (attr::SOCIAL_HANDLES, 15.0),
        ];
        let (count, value) = channels
            .iter()
            .filter(|(name, _)| inputs.present(name))
            .fold((0.0, 0.0), |(n, v), (_, points)| (n + 1.0, v + points));
        if count == 0.0 {
            return Err(SignalGap {
                signal: self.name().to_string(),
                reason: "no contact channel".to_string(),
            });
        }
        Ok(ScoringSignal::new(self.name(), count, value, self.weight))
    }
}

pub struct TeamSizeSignal {
    pub weight: f64,
    pub saturation: f64,
}

impl SignalExtractor for TeamSizeSignal {
    fn name(&self) -> &'static str {
        "team_size"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let count = inputs
            .number(attr::EMPLOYEE_COUNT)
            .filter(|c| *c >= 0.0)
            .ok_or_else(|| SignalGap::missing(self.name(), attr::EMPLOYEE_COUNT))?;
        if self.saturation <= 0.0 {
            return Err(SignalGap::invalid(self.name(), "saturation must be positive"));
        }
        let normalized = (count + 1.0).log10() / (self.saturation + 1.0).log10() * MAX_SIGNAL_VALUE;
        Ok(ScoringSignal::new(self.name(), count, normalized, self.weight))
    }
}

pub struct RegistrationSignal {
    pub weight: f64,
}

impl SignalExtractor for RegistrationSignal {
    fn name(&self) -> &'static str {
        "registration"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn extract(&self, inputs: &SignalInputs) -> Result<ScoringSignal, SignalGap> {
        let registered = inputs
            .attributes
            .get(attr::REGISTERED)
            .and_then(AttrValue::as_bool)
            .or_else(|| inputs.present(attr::REGISTRY_ID).then_some(true))
            .ok_or_else(|| SignalGap::missing(self.name(), attr::REGISTERED))?;
        let (raw, normalized) = if registered { (1.0, 100.0) } else { (0.0, 0.0) };
        Ok(ScoringSignal::new(self.name(), raw, normalized, self.weight))
    }
}

/// Result of one scoring pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 0.0..=10.0, one decimal
    pub quality_score: f64,
    pub signals: Vec<ScoringSignal>,
    #[serde(skip)]
    pub gaps: Vec<SignalGap>,
    pub as_of: DateTime<Utc>,
}

/// Weighted combination of signal extractors
pub struct ScoringEngine {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl ScoringEngine {
    pub fn new(config: &ScoringConfig) -> Self {
        let w = &config.weights;
        Self::with_extractors(vec![
            Box::new(RatingSignal { weight: w.rating }),
            Box::new(ReviewVolumeSignal {
                weight: w.review_volume,
                k: config.review_volume_k,
            }),
            Box::new(BusinessAgeSignal {
                weight: w.business_age,
                midpoint_years: config.age_midpoint_years,
                steepness: config.age_steepness,
            }),
            Box::new(WebPresenceSignal {
                weight: w.web_presence,
            }),
            Box::new(TeamSizeSignal {
                weight: w.team_size,
                saturation: config.team_size_saturation,
            }),
            Box::new(RegistrationSignal {
                weight: w.registration,
            }),
        ])
    }

    pub fn with_extractors(extractors: Vec<Box<dyn SignalExtractor>>) -> Self {
        Self { extractors }
    }

    /// Score a profile's current attributes
    pub fn score(&self, profile: &Profile, as_of: DateTime<Utc>) -> Result<ScoreResult, ScoringError> {
        self.score_inputs(
            &SignalInputs::from_profile(profile, as_of),
            &profile.profile_id().to_string(),
        )
    }

    /// Score arbitrary inputs; `subject` only labels errors and logs
    pub fn score_inputs(&self, inputs: &SignalInputs, subject: &str) -> Result<ScoreResult, ScoringError> {
        let mut signals = Vec::new();
        let mut gaps = Vec::new();

        for extractor in self
            .extractors
            .iter()
            .filter(|e| e.weight().is_finite() && e.weight() > 0.0)
        {
            match extractor.extract(inputs) {
                Ok(signal) if !signal.normalized_value.is_finite() => {
                    gaps.push(SignalGap::invalid(extractor.name(), "not a finite value"));
                }
                Ok(signal) => signals.push(signal),
                Err(gap) => gaps.push(gap),
            }
        }

        let total_weight: f64 = signals.iter().map(|s| s.weight).sum();
        if signals.is_empty() || total_weight <= 0.0 {
            return Err(ScoringError::InsufficientSignal(subject.to_string()));
        }

        for signal in &mut signals {
            signal.effective_weight = signal.weight / total_weight;
        }
        let weighted_sum: f64 = signals.iter().map(ScoringSignal::contribution).sum();
        let quality_score = (weighted_sum.round() / 10.0).clamp(MIN_QUALITY_SCORE, MAX_QUALITY_SCORE);

        debug!(
            "Scored {}: {:.1} from {} signals ({} gaps)",
            subject,
            quality_score,
            signals.len(),
            gaps.len()
        );

        Ok(ScoreResult {
            quality_score,
            signals,
            gaps,
            as_of: inputs.as_of,
        })
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, AttrValue)]) -> SignalInputs {
        let attrs = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let as_of = "2024-06-01T00:00:00Z".parse().unwrap();
        SignalInputs::new(attrs, as_of)
    }

    #[test]
    fn test_signal_functions() {
        let rating = RatingSignal { weight: 1.0 }
            .extract(&inputs(&[(attr::RATING, 4.5.into())]))
            .unwrap();
        assert_eq!(rating.normalized_value, 87.5);

        let reviews = ReviewVolumeSignal { weight: 1.0, k: 40.0 }
            .extract(&inputs(&[(attr::REVIEW_COUNT, 127.0.into())]))
            .unwrap();
        assert!((reviews.normalized_value - 84.29).abs() < 0.01);

        let age = BusinessAgeSignal {
            weight: 1.0,
            midpoint_years: 5.0,
            steepness: 0.8,
        };
        let at_midpoint = age
            .extract(&inputs(&[(attr::YEARS_IN_BUSINESS, 5.0.into())]))
            .unwrap();
        assert!((at_midpoint.normalized_value - 50.0).abs() < 1e-9);
        let older = age
            .extract(&inputs(&[(attr::FOUNDED_YEAR, 2010.0.into())]))
            .unwrap();
        assert!(older.normalized_value > 99.0);
    }

    #[test]
    fn test_weight_redistribution() {
        let engine = ScoringEngine::default();

        let only_rating = engine
            .score_inputs(&inputs(&[(attr::RATING, 5.0.into())]), "t")
            .unwrap();
        assert_eq!(only_rating.quality_score, 10.0);
        assert_eq!(only_rating.signals.len(), 1);
        assert_eq!(only_rating.signals[0].effective_weight, 1.0);
        assert_eq!(only_rating.gaps.len(), 5);

        let two = engine
            .score_inputs(
                &inputs(&[(attr::RATING, 4.0.into()), (attr::REGISTERED, true.into())]),
                "t",
            )
            .unwrap();
        // 75 * 0.75 + 100 * 0.25 = 81.25
        assert_eq!(two.quality_score, 8.1);
    }

    #[test]
    fn test_no_computable_signal() {
        let engine = ScoringEngine::default();
        let err = engine
            .score_inputs(&inputs(&[(attr::NAME, "Piet".into())]), "piet")
            .unwrap_err();
        assert_eq!(err, ScoringError::InsufficientSignal("piet".into()));
    }

    #[test]
    fn test_score_stays_in_range() {
        let engine = ScoringEngine::default();
        let extreme = engine
            .score_inputs(
                &inputs(&[
                    (attr::RATING, 5.0.into()),
                    (attr::REVIEW_COUNT, 1_000_000.0.into()),
                    (attr::EMPLOYEE_COUNT, 10_000.0.into()),
                    (attr::YEARS_IN_BUSINESS, 80.0.into()),
                    (attr::WEBSITE, "jansen.nl".into()),
                    (attr::EMAIL, "info@jansen.nl".into()),
                    (attr::PHONE, "31612345678".into()),
                    (
                        attr::SOCIAL_HANDLES,
                        AttrValue::List(vec!["jansen".into()]),
                    ),
                    (attr::REGISTERED, true.into()),
                ]),
                "t",
            )
            .unwrap();
        assert_eq!(extreme.quality_score, 10.0);

        let poor = engine
            .score_inputs(
                &inputs(&[(attr::RATING, 0.5.into()), (attr::REGISTERED, false.into())]),
                "t",
            )
            .unwrap();
        assert_eq!(poor.quality_score, 0.0);
    }

    #[test]
    fn test_degenerate_config_becomes_gap() {
        let config = ScoringConfig {
            team_size_saturation: 0.0,
            age_steepness: f64::NAN,
            ..Default::default()
        };
        let result = ScoringEngine::new(&config)
            .score_inputs(
                &inputs(&[
                    (attr::EMPLOYEE_COUNT, 0.0.into()),
                    (attr::YEARS_IN_BUSINESS, 8.0.into()),
                    (attr::RATING, 4.0.into()),
                ]),
                "t",
            )
            .unwrap();

        assert!(result.quality_score.is_finite());
        assert_eq!(result.quality_score, 7.5);
        let gaps: Vec<&str> = result.gaps.iter().map(|g| g.signal.as_str()).collect();
        assert!(gaps.contains(&"team_size"));
        assert!(gaps.contains(&"business_age"));
    }
}
