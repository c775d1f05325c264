//! Ring classification
//!
//! Rule-first, with the quality score as tie-breaker:
//! - Ring 4 only from an explicit staff membership flag, never from score
//! - Ring 1 needs an established business (age threshold) and the established floor
//! - Ring 2 needs an active practitioner signal and the practitioner floor
//! - Ring 3 takes everything else
//!
//! Rule matches carry confidence 1.0. The Ring 3 default gets a confidence
//! that shrinks as the score approaches one of the floors.

use serde::{Deserialize, Serialize};

use radar_core::{
    attr, audit_trail, business_age_years, AttrValue, ExtractedAttributes, Profile, Ring,
};

use crate::ScoreResult;

/// Classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Years in business that make an established business
    pub established_min_years: f64,
    /// Minimum quality score for Ring 1
    pub established_floor: f64,
    /// Minimum quality score for Ring 2
    pub practitioner_floor: f64,
    /// Ring 3 confidence right at a floor
    pub default_min_confidence: f64,
    /// Ring 3 confidence far away from any floor
    pub default_max_confidence: f64,
    /// Score distance at which Ring 3 confidence saturates
    pub confidence_span: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            established_min_years: 5.0,
            established_floor: 7.0,
            practitioner_floor: 5.0,
            default_min_confidence: 0.5,
            default_max_confidence: 0.95,
            confidence_span: 5.0,
        }
    }
}

/// Ring decision with confidence and rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub ring: Ring,
    pub confidence: f64,
    pub rationale: String,
}

/// Assigns rings
#[derive(Debug, Clone, Default)]
pub struct RingClassifier {
    config: ClassifierConfig,
}

impl RingClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a scored profile. Never fails.
    pub fn classify(&self, profile: &Profile, score: &ScoreResult) -> Classification {
        self.classify_attributes(&profile.attribute_values(), score)
    }

    pub fn classify_attributes(
        &self,
        attributes: &ExtractedAttributes,
        score: &ScoreResult,
    ) -> Classification {
        let quality = score.quality_score;
        let audit = audit_trail(&score.signals);
        let flag = |name: &str| attributes.get(name).and_then(AttrValue::as_bool);

        let (ring, confidence, reason) = if flag(attr::STAFF_MEMBER) == Some(true) {
            (Ring::Academy, 1.0, "explicit staff membership".to_string())
        } else {
            let age = business_age_years(attributes, score.as_of);
            let established = age.is_some_and(|y| y >= self.config.established_min_years);
            let practitioner = flag(attr::FREELANCER) == Some(true)
                || flag(attr::REGISTERED) == Some(true)
                || attributes.contains_key(attr::REGISTRY_ID);

            if established && quality >= self.config.established_floor {
                let years = age.unwrap_or_default();
                (
                    Ring::Established,
                    1.0,
                    format!(
                        "established {:.0} years, score {:.1} >= {:.1}",
                        years, quality, self.config.established_floor
                    ),
                )
            } else if practitioner && quality >= self.config.practitioner_floor {
                (
                    Ring::Freelancer,
                    1.0,
                    format!(
                        "active practitioner, score {:.1} >= {:.1}",
                        quality, self.config.practitioner_floor
                    ),
                )
            } else {
                let why = if !practitioner && !established {
                    "no registration or practitioner signal"
                } else {
                    "below ring floors"
                };
                (
                    Ring::Starter,
                    self.default_confidence(quality),
                    format!("default: {}, score {:.1}", why, quality),
                )
            }
        };

        Classification {
            ring,
            confidence,
            rationale: format!("{} | signals: {}", reason, audit),
        }
    }

    /// Distance to the nearest floor, scaled into the configured band
    fn default_confidence(&self, quality: f64) -> f64 {
        let distance = [self.config.established_floor, self.config.practitioner_floor]
            .iter()
            .map(|floor| (quality - floor).abs())
            .fold(f64::INFINITY, f64::min);
        let span = self.config.confidence_span.max(f64::EPSILON);
        let min = self.config.default_min_confidence;
        let max = self.config.default_max_confidence.min(0.99);
        min + (max - min) * (distance / span).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn as_of() -> DateTime<Utc> {
        "2024-06-01T00:00:00Z".parse().unwrap()
    }

    fn attrs(pairs: &[(&str, AttrValue)]) -> ExtractedAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn score(quality_score: f64) -> ScoreResult {
        ScoreResult {
            quality_score,
            signals: Vec::new(),
            gaps: Vec::new(),
            as_of: as_of(),
        }
    }

    #[test]
    fn test_established_registered_business() {
        let classifier = RingClassifier::default();
        let c = classifier.classify_attributes(
            &attrs(&[
                (attr::YEARS_IN_BUSINESS, 8.0.into()),
                (attr::REGISTERED, true.into()),
            ]),
            &score(8.5),
        );
        assert_eq!(c.ring, Ring::Established);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_freelancer_without_age() {
        let classifier = RingClassifier::default();
        let c = classifier
            .classify_attributes(&attrs(&[(attr::FREELANCER, true.into())]), &score(6.5));
        assert_eq!(c.ring, Ring::Freelancer);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_unregistered_default() {
        let classifier = RingClassifier::default();
        let c = classifier
            .classify_attributes(&attrs(&[(attr::REGISTERED, false.into())]), &score(4.5));
        assert_eq!(c.ring, Ring::Starter);
        assert!(c.confidence < 1.0);
        assert!(c.rationale.starts_with("default"));
    }

    #[test]
    fn test_high_score_never_means_staff() {
        let classifier = RingClassifier::default();
        let c = classifier.classify_attributes(
            &attrs(&[
                (attr::FOUNDED_YEAR, 2010.0.into()),
                (attr::REGISTRY_ID, "12345678".into()),
            ]),
            &score(9.8),
        );
        assert_eq!(c.ring, Ring::Established);

        for pairs in [
            vec![],
            vec![(attr::FREELANCER, AttrValue::Flag(true))],
            vec![(attr::STAFF_MEMBER, AttrValue::Flag(false))],
        ] {
            let c = classifier.classify_attributes(&attrs(&pairs), &score(9.8));
            assert_ne!(c.ring, Ring::Academy);
        }
    }

    #[test]
    fn test_staff_flag_short_circuits() {
        let classifier = RingClassifier::default();
        let c = classifier.classify_attributes(
            &attrs(&[(attr::STAFF_MEMBER, true.into())]),
            &score(1.0),
        );
        assert_eq!(c.ring, Ring::Academy);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_default_confidence_grows_with_distance() {
        let classifier = RingClassifier::default();
        let near = classifier.classify_attributes(&attrs(&[]), &score(4.9));
        let far = classifier.classify_attributes(&attrs(&[]), &score(0.5));
        assert_eq!(near.ring, Ring::Starter);
        assert!(near.confidence < far.confidence);
        assert!(far.confidence < 1.0);
    }

    #[test]
    fn test_established_below_floor_falls_to_practitioner() {
        let classifier = RingClassifier::default();
        let c = classifier.classify_attributes(
            &attrs(&[
                (attr::YEARS_IN_BUSINESS, 12.0.into()),
                (attr::REGISTERED, true.into()),
            ]),
            &score(6.0),
        );
        assert_eq!(c.ring, Ring::Freelancer);
    }
}
