//! Ring tiers and their outreach metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four priority classes a profile is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Ring {
    /// Established business with a track record
    Established = 1,
    /// Active freelancer or registered individual
    Freelancer = 2,
    /// Starter or hobbyist, the catch-all tier
    Starter = 3,
    /// Internal staff, only assigned from an explicit membership signal
    Academy = 4,
}

impl Ring {
    pub const ALL: [Ring; 4] = [Ring::Established, Ring::Freelancer, Ring::Starter, Ring::Academy];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ring::Established => "Established",
            Ring::Freelancer => "Freelancer",
            Ring::Starter => "Starter",
            Ring::Academy => "Academy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Ring::Established => "Registered business, several years in operation, strong reputation",
            Ring::Freelancer => "Self-employed professional building a client base",
            Ring::Starter => "Hobbyist or side-job worker without a registered business",
            Ring::Academy => "Internal staff and trainees",
        }
    }

    /// Value proposition used when reaching out to this ring
    pub fn hooks(&self) -> &'static [&'static str] {
        match self {
            Ring::Established => &[
                "Qualified leads in your region",
                "Fill gaps in your planning",
                "No upfront subscription",
            ],
            Ring::Freelancer => &[
                "Steady stream of jobs",
                "Build reviews on a trusted platform",
                "Keep your own rates",
            ],
            Ring::Starter => &[
                "Earn extra with small jobs nearby",
                "Grow towards a registered business",
                "Free starter guidance",
            ],
            Ring::Academy => &["Internal training track", "Certification support"],
        }
    }
}

impl From<Ring> for u8 {
    fn from(ring: Ring) -> Self {
        ring as u8
    }
}

impl TryFrom<u8> for Ring {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Ring::Established),
            2 => Ok(Ring::Freelancer),
            3 => Ok(Ring::Starter),
            4 => Ok(Ring::Academy),
            other => Err(format!("ring must be 1-4, got {}", other)),
        }
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ring {} ({})", self.number(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_numbers() {
        for (i, ring) in Ring::ALL.iter().enumerate() {
            assert_eq!(ring.number() as usize, i + 1);
            assert_eq!(Ring::try_from(ring.number()).unwrap(), *ring);
        }
        assert!(Ring::try_from(0).is_err());
        assert!(Ring::try_from(5).is_err());
    }

    #[test]
    fn test_ring_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Ring::Freelancer).unwrap(), "2");
        assert!(serde_json::from_str::<Ring>("7").is_err());
    }
}
