//! Error types shared across the pipeline
//!
//! Every error maps onto one [`ErrorClass`], which decides whether the
//! orchestrator retries the failed stage.

use thiserror::Error;

use crate::FailureReason;

/// Failure taxonomy driving retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or insufficient input; never retried
    FatalInput,
    /// Rate limit, timeout or transport trouble; retried with backoff
    TransientSource,
    /// A signal could not be computed; degrades scoring only
    SignalGap,
    /// Lost an identity race; resolved by re-reading
    ConcurrencyConflict,
    /// Outreach side; never unwinds earlier stages
    Dispatch,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClass::TransientSource | ErrorClass::ConcurrencyConflict | ErrorClass::Dispatch
        )
    }
}

/// Common view over the pipeline's typed errors
pub trait PipelineError: std::error::Error {
    fn class(&self) -> ErrorClass;

    /// Reason recorded on the run item when this error is final
    fn reason(&self) -> FailureReason;

    fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Normalizer failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

impl PipelineError for NormalizeError {
    fn class(&self) -> ErrorClass {
        ErrorClass::FatalInput
    }

    fn reason(&self) -> FailureReason {
        match self {
            NormalizeError::Malformed(_) => FailureReason::MalformedInput,
            NormalizeError::InsufficientData(_) => FailureReason::InsufficientData,
        }
    }
}

/// Source fetcher failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl PipelineError for SourceError {
    fn class(&self) -> ErrorClass {
        match self {
            SourceError::NotFound(_) | SourceError::Decode(_) => ErrorClass::FatalInput,
            SourceError::RateLimited(_) | SourceError::Timeout(_) | SourceError::Transport(_) => {
                ErrorClass::TransientSource
            }
        }
    }

    fn reason(&self) -> FailureReason {
        match self {
            SourceError::NotFound(_) => FailureReason::NotFound,
            SourceError::RateLimited(_) => FailureReason::RateLimited,
            SourceError::Timeout(_) => FailureReason::Timeout,
            SourceError::Transport(_) | SourceError::Decode(_) => FailureReason::Source,
        }
    }
}

/// Classification signal provider failure; always soft
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Extraction failed: {0}")]
pub struct ExtractionError(pub String);

impl PipelineError for ExtractionError {
    fn class(&self) -> ErrorClass {
        ErrorClass::SignalGap
    }

    fn reason(&self) -> FailureReason {
        FailureReason::Source
    }
}

/// Scoring failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("No computable signal for profile {0}")]
    InsufficientSignal(String),
}

impl PipelineError for ScoringError {
    fn class(&self) -> ErrorClass {
        ErrorClass::SignalGap
    }

    fn reason(&self) -> FailureReason {
        FailureReason::InsufficientData
    }
}

/// Outreach dispatcher failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Dispatch failed: {0}")]
pub struct DispatchError(pub String);

impl PipelineError for DispatchError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Dispatch
    }

    fn reason(&self) -> FailureReason {
        FailureReason::Dispatch
    }
}

/// Profile store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Identity conflict on key {0}")]
    Conflict(String),

    #[error("Unknown profile {0}")]
    UnknownProfile(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl PipelineError for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Conflict(_) => ErrorClass::ConcurrencyConflict,
            StoreError::UnknownProfile(_) => ErrorClass::FatalInput,
            StoreError::Backend(_) => ErrorClass::TransientSource,
        }
    }

    fn reason(&self) -> FailureReason {
        FailureReason::Store
    }
}
