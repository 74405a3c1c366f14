//! Premises intake: address validation, duplicate detection, and occupancy
//! classification for batches of business-location records.

pub mod adapters;
pub mod batch;
mod config;
pub mod domain;
pub mod export;
pub mod intake;
pub mod matching;
pub mod pipeline;
pub mod retry;
pub mod services;
pub(crate) mod verification;

#[cfg(test)]
mod tests;

pub use batch::{BatchError, BatchResult, BatchRunner, BatchSummary, DrainHandle};
pub use config::PipelineConfig;
pub use domain::{
    AddressQuery, CandidateMatch, Coordinates, ErrorReason, FailureStage, Neighbor,
    OccupancyResult, OutcomeKind, PremiseAttributes, PremiseId, RawRecord, RowError, RowId,
    RowOutcome, ValidatedAddress,
};
pub use export::{ExportError, ExportPaths, OutcomeWriter};
pub use intake::{IntakeError, PremiseCsvReader};
pub use pipeline::{RowPipeline, RowState, StageTracker};
pub use retry::{RetryPolicy, Retryable};
pub use services::{
    AddressValidator, ClassificationFailure, OccupancyClassifier, PremiseServices,
    ProximityFailure, ProximityMatcher, ScoringFailure, SimilarityScorer, ValidationFailure,
};
