//! Per-record state machine.
//!
//! Each record advances through an explicit [`RowState`] value. Transitions are plain
//! methods that consume the current state plus the collaborator's response, so the
//! branching is synchronous and testable without any services. [`RowPipeline`] is the
//! async driver: it performs the external call each state asks for (through the
//! bounded-retry wrapper) and feeds the result back into the transition.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::config::PipelineConfig;
use super::domain::{
    CandidateMatch, ErrorReason, FailureStage, Neighbor, OccupancyResult, PremiseAttributes,
    RawRecord, RowError, RowOutcome, ValidatedAddress,
};
use super::matching::{is_duplicate, select_best_match};
use super::retry::call_with_retry;
use super::services::{
    ClassificationFailure, PremiseServices, ProximityFailure, ScoringFailure, ValidationFailure,
};
use super::verification::verify_accepted;

const FALLBACK_BUSINESS_TYPE: &str = "establishment";

/// Where a single record currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    AddressValidating(AddressValidating),
    ProximityChecking(ProximityChecking),
    SimilarityScoring(SimilarityScoring),
    Classifying(Classifying),
    Finished(RowOutcome),
}

impl RowState {
    /// Intake check that needs no external call: required fields are present.
    /// Jurisdiction support is decided by the classifier once the state is resolved.
    pub fn start(record: RawRecord) -> Self {
        let missing = record.missing_fields();
        if !missing.is_empty() {
            let error = RowError::new(
                FailureStage::Intake,
                ErrorReason::InvalidAddress,
                "missing_fields",
                format!("missing required fields: {}", missing.join(", ")),
            );
            return Self::Finished(RowOutcome::errored(record, error));
        }

        Self::AddressValidating(AddressValidating { record })
    }

    /// Stage a row in this state would be charged with if it failed now.
    pub fn stage(&self) -> Option<FailureStage> {
        match self {
            Self::AddressValidating(_) => Some(FailureStage::AddressValidation),
            Self::ProximityChecking(_) => Some(FailureStage::ProximityLookup),
            Self::SimilarityScoring(_) => Some(FailureStage::SimilarityScoring),
            Self::Classifying(_) => Some(FailureStage::Classification),
            Self::Finished(_) => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddressValidating {
    pub record: RawRecord,
}

impl AddressValidating {
    pub fn on_validated(
        self,
        result: Result<ValidatedAddress, ValidationFailure>,
        min_confidence: f64,
    ) -> RowState {
        let failure = match result {
            Ok(address) if address.confidence >= min_confidence => {
                let standardized_name =
                    standardize_name(&self.record.business_name, address.place_name.as_deref());
                return RowState::ProximityChecking(ProximityChecking {
                    record: self.record,
                    address,
                    standardized_name,
                });
            }
            Ok(address) => ValidationFailure::LowConfidence {
                confidence: address.confidence,
                minimum: min_confidence,
            },
            Err(failure) => failure,
        };

        let error = RowError::new(
            FailureStage::AddressValidation,
            ErrorReason::InvalidAddress,
            failure.cause(),
            failure.to_string(),
        );
        RowState::Finished(RowOutcome::errored(self.record, error))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityChecking {
    pub record: RawRecord,
    pub address: ValidatedAddress,
    pub standardized_name: String,
}

impl ProximityChecking {
    /// No neighbors short-circuits straight to classification.
    pub fn on_neighbors(self, result: Result<Vec<Neighbor>, ProximityFailure>) -> RowState {
        match result {
            Ok(neighbors) if neighbors.is_empty() => RowState::Classifying(Classifying {
                record: self.record,
                address: self.address,
                standardized_name: self.standardized_name,
                nearest_match: None,
            }),
            Ok(neighbors) => RowState::SimilarityScoring(SimilarityScoring {
                record: self.record,
                address: self.address,
                standardized_name: self.standardized_name,
                neighbors,
            }),
            Err(failure) => {
                let error = RowError::new(
                    FailureStage::ProximityLookup,
                    ErrorReason::MatchingUnavailable,
                    failure.cause(),
                    failure.to_string(),
                );
                RowState::Finished(RowOutcome::errored(self.record, error))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityScoring {
    pub record: RawRecord,
    pub address: ValidatedAddress,
    pub standardized_name: String,
    pub neighbors: Vec<Neighbor>,
}

impl SimilarityScoring {
    /// The candidate side of every comparison. The input name is kept so branch
    /// suffixes ("Store #12") survive standardization.
    pub fn candidate_attributes(&self) -> PremiseAttributes {
        let input_name = self.record.business_name.trim();
        let name = if input_name.is_empty() {
            self.standardized_name.clone()
        } else {
            input_name.to_string()
        };

        PremiseAttributes {
            name,
            address: self.address.single_line(),
            business_type: self.record.business_type.trim().to_string(),
        }
    }

    /// A scoring failure is terminal; it never counts as "not a duplicate".
    pub fn on_scored(
        self,
        result: Result<Vec<CandidateMatch>, ScoringFailure>,
        threshold: f64,
    ) -> RowState {
        let scored = match result {
            Ok(scored) => scored,
            Err(failure) => {
                let error = RowError::new(
                    FailureStage::SimilarityScoring,
                    ErrorReason::MatchingUnavailable,
                    failure.cause(),
                    failure.to_string(),
                );
                return RowState::Finished(RowOutcome::errored(self.record, error));
            }
        };

        match select_best_match(scored) {
            Some(best) if is_duplicate(&best, threshold) => RowState::Finished(RowOutcome::Duplicate {
                record: self.record,
                matched_premise_id: best.premise_id(),
                similarity: best.score,
                distance_km: best.distance_km(),
            }),
            nearest_match => RowState::Classifying(Classifying {
                record: self.record,
                address: self.address,
                standardized_name: self.standardized_name,
                nearest_match,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classifying {
    pub record: RawRecord,
    pub address: ValidatedAddress,
    pub standardized_name: String,
    pub nearest_match: Option<CandidateMatch>,
}

impl Classifying {
    /// Record's business type, else the geocoder's place type, else a generic fallback.
    pub fn business_type(&self) -> String {
        let declared = self.record.business_type.trim();
        if !declared.is_empty() {
            return declared.to_string();
        }

        self.address
            .place_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(FALLBACK_BUSINESS_TYPE)
            .to_string()
    }

    /// Low confidence is accepted as-is; only a failed call is an error.
    pub fn on_classified(
        self,
        result: Result<OccupancyResult, ClassificationFailure>,
        verify_output: bool,
    ) -> RowState {
        let occupancy = match result {
            Ok(occupancy) => occupancy,
            Err(failure) => {
                let error = RowError::new(
                    FailureStage::Classification,
                    ErrorReason::ClassificationFailed,
                    failure.cause(),
                    failure.to_string(),
                );
                return RowState::Finished(RowOutcome::errored(self.record, error));
            }
        };

        if verify_output {
            if let Err(failure) = verify_accepted(&self.standardized_name, &self.address, &occupancy)
            {
                let error = RowError::new(
                    FailureStage::OutputVerification,
                    ErrorReason::OutputInvalid,
                    "verification_failed",
                    failure.to_string(),
                );
                return RowState::Finished(RowOutcome::errored(self.record, error));
            }
        }

        RowState::Finished(RowOutcome::Accepted {
            record: self.record,
            standardized_name: self.standardized_name,
            address: self.address,
            occupancy,
            nearest_match: self.nearest_match,
        })
    }
}

/// Prefers the geocoder's business name unless it is really a street address.
pub fn standardize_name(input_name: &str, place_name: Option<&str>) -> String {
    let place_name = place_name
        .map(str::trim)
        .filter(|name| !name.is_empty() && !looks_like_street_address(name));

    let chosen = match place_name {
        Some(name) => name.to_string(),
        None => title_case(input_name),
    };

    chosen.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_street_address(value: &str) -> bool {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && value[digits..].starts_with(' ')
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shared view of the stage a row is in, readable after the row's task panics.
#[derive(Debug, Clone, Default)]
pub struct StageTracker(Arc<AtomicU8>);

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, stage: FailureStage) {
        self.0.store(stage.as_u8(), Ordering::Release);
    }

    pub fn current(&self) -> FailureStage {
        FailureStage::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Drives one record through [`RowState`] against the configured collaborators.
pub struct RowPipeline {
    services: PremiseServices,
    config: PipelineConfig,
}

impl RowPipeline {
    pub fn new(services: PremiseServices, config: PipelineConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn services(&self) -> &PremiseServices {
        &self.services
    }

    pub async fn run(&self, record: RawRecord, tracker: &StageTracker) -> RowOutcome {
        let span = info_span!("premise_row", row = %record.row_id);
        self.drive(record, tracker).instrument(span).await
    }

    async fn drive(&self, record: RawRecord, tracker: &StageTracker) -> RowOutcome {
        let mut state = RowState::start(record);

        loop {
            if let Some(stage) = state.stage() {
                tracker.set(stage);
                debug!(stage = stage.label(), "entering stage");
            }

            state = match state {
                RowState::AddressValidating(step) => {
                    let result = self.validate(&step).await;
                    step.on_validated(result, self.config.min_address_confidence)
                }
                RowState::ProximityChecking(step) => {
                    let result = self.find_neighbors(&step).await;
                    step.on_neighbors(result)
                }
                RowState::SimilarityScoring(step) => {
                    let result = self.score_neighbors(&step).await;
                    step.on_scored(result, self.config.duplicate_threshold)
                }
                RowState::Classifying(step) => {
                    let result = self.classify(&step).await;
                    step.on_classified(result, self.config.verify_output)
                }
                RowState::Finished(outcome) => {
                    log_outcome(&outcome);
                    return outcome;
                }
            };
        }
    }

    async fn validate(&self, step: &AddressValidating) -> Result<ValidatedAddress, ValidationFailure> {
        let validator = &self.services.validator;
        let query = step.record.address_query();
        call_with_retry(&self.config.retry, "address_validation", || {
            validator.validate(&query)
        })
        .await
    }

    async fn find_neighbors(&self, step: &ProximityChecking) -> Result<Vec<Neighbor>, ProximityFailure> {
        let proximity = &self.services.proximity;
        let origin = step.address.coordinates();
        let radius_km = self.config.proximity_radius_km;
        let max_k = self.config.max_neighbors;

        let mut neighbors = call_with_retry(&self.config.retry, "proximity_lookup", || {
            proximity.nearest(origin, radius_km, max_k)
        })
        .await?;
        neighbors.truncate(max_k);
        debug!(neighbors = neighbors.len(), "proximity lookup complete");
        Ok(neighbors)
    }

    /// Scores every neighbor in order; the first unavailable score ends the row.
    async fn score_neighbors(
        &self,
        step: &SimilarityScoring,
    ) -> Result<Vec<CandidateMatch>, ScoringFailure> {
        let scorer = &self.services.scorer;
        let candidate = step.candidate_attributes();
        let mut scored = Vec::with_capacity(step.neighbors.len());

        for neighbor in &step.neighbors {
            let attributes = neighbor.attributes();
            let score = call_with_retry(&self.config.retry, "similarity_scoring", || {
                scorer.score(&candidate, &attributes)
            })
            .await?;

            if !score.is_finite() {
                return Err(ScoringFailure::Unparseable(format!(
                    "non-numeric score for premise {}",
                    neighbor.premise_id
                )));
            }

            debug!(premise_id = %neighbor.premise_id, score, "scored neighbor");
            scored.push(CandidateMatch::new(neighbor.clone(), score));
        }

        Ok(scored)
    }

    async fn classify(&self, step: &Classifying) -> Result<OccupancyResult, ClassificationFailure> {
        let classifier = &self.services.classifier;
        let business_type = step.business_type();
        let state_code = step.address.state_code.trim().to_ascii_uppercase();
        call_with_retry(&self.config.retry, "classification", || {
            classifier.classify(&business_type, &state_code)
        })
        .await
    }
}

fn log_outcome(outcome: &RowOutcome) {
    match outcome {
        RowOutcome::Accepted {
            standardized_name,
            occupancy,
            ..
        } => info!(
            name = %standardized_name,
            occupancy = %occupancy.category,
            confidence = occupancy.confidence,
            "premise accepted"
        ),
        RowOutcome::Duplicate {
            matched_premise_id,
            similarity,
            ..
        } => info!(%matched_premise_id, similarity, "duplicate premise"),
        RowOutcome::Errored { error, .. } => warn!(
            stage = error.stage.label(),
            reason = error.reason.code(),
            cause = %error.cause,
            "premise rejected: {}",
            error.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_prefers_place_name() {
        assert_eq!(
            standardize_name("schenes  store", Some("Schene's Market")),
            "Schene's Market"
        );
    }

    #[test]
    fn standardize_ignores_place_names_that_are_addresses() {
        assert_eq!(
            standardize_name("bob's   TIRE shop", Some("1860 Millertown Rd")),
            "Bob's Tire Shop"
        );
        assert_eq!(standardize_name("acme", None), "Acme");
        assert_eq!(standardize_name("acme", Some("   ")), "Acme");
    }

    #[test]
    fn standardize_keeps_names_that_start_with_numbers() {
        assert_eq!(standardize_name("x", Some("7-Eleven")), "7-Eleven");
    }

    #[test]
    fn tracker_defaults_to_intake() {
        let tracker = StageTracker::new();
        assert_eq!(tracker.current(), FailureStage::Intake);
        tracker.set(FailureStage::Classification);
        assert_eq!(tracker.clone().current(), FailureStage::Classification);
    }
}
