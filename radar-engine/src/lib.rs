//! Radar Engine
//!
//! The decision stages of the pipeline, each usable on its own:
//! - **Resolver**: matches a candidate record to an existing profile or creates one
//! - **Merger**: layers record attributes onto a profile under trust ordering
//! - **Enrichment**: registry lookups for profiles carrying a registry number
//! - **Scoring**: weighted quality score from independent signal extractors
//! - **Classifier**: rule-first ring assignment with confidence and rationale
//! - **Providers**: rule-based and LLM signal extraction from raw text
//! - **Outreach**: ring-appropriate dispatch contract and implementations

pub mod backend;
pub mod classifier;
pub mod enrichment;
pub mod merger;
pub mod outreach;
pub mod provider;
pub mod resolver;
pub mod scoring;

pub use backend::*;
pub use classifier::*;
pub use enrichment::*;
pub use merger::*;
pub use outreach::*;
pub use provider::*;
pub use resolver::*;
pub use scoring::*;
