//! Radar Core - record, profile and run types for lead discovery
//!
//! This crate provides the foundational primitives:
//! - Provenance-tagged attributes and source trust ordering
//! - Candidate records (one observation from one source)
//! - Profiles (the durable identity a record resolves to) and rings
//! - Pipeline runs with per-item stage tracking
//! - The normalizer turning raw inputs into candidate records

pub mod attributes;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod profile;
pub mod provenance;
pub mod record;
pub mod ring;
pub mod run;
pub mod signals;

pub use attributes::*;
pub use error::*;
pub use extract::*;
pub use normalize::*;
pub use profile::*;
pub use provenance::*;
pub use record::*;
pub use ring::*;
pub use run::*;
pub use signals::*;

/// Minimum quality score
pub const MIN_QUALITY_SCORE: f64 = 0.0;

/// Maximum quality score
pub const MAX_QUALITY_SCORE: f64 = 10.0;

/// Upper bound of a normalized signal value
pub const MAX_SIGNAL_VALUE: f64 = 100.0;

/// Maximum characters of raw text kept on a record
pub const MAX_RAW_TEXT_CHARS: usize = 5000;
