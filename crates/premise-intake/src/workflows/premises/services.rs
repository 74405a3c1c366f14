use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::domain::{
    AddressQuery, Coordinates, Neighbor, OccupancyResult, PremiseAttributes, ValidatedAddress,
};
use super::retry::Retryable;

/// Turns raw address text into a normalized, geocoded address.
#[async_trait]
pub trait AddressValidator: Send + Sync {
    async fn validate(&self, query: &AddressQuery) -> Result<ValidatedAddress, ValidationFailure>;
}

/// Read-only neighbor lookup over the stored premises.
#[async_trait]
pub trait ProximityMatcher: Send + Sync {
    /// Up to `max_k` stored premises within `radius_km`, nearest first. No neighbors is `Ok(vec![])`.
    async fn nearest(
        &self,
        origin: Coordinates,
        radius_km: f64,
        max_k: usize,
    ) -> Result<Vec<Neighbor>, ProximityFailure>;

    /// Checked once before a batch starts; failure aborts the whole run.
    async fn health_check(&self) -> Result<(), ProximityFailure> {
        Ok(())
    }
}

/// Scores how likely a candidate and a stored neighbor are the same business.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    /// Score in [0, 1].
    async fn score(
        &self,
        candidate: &PremiseAttributes,
        neighbor: &PremiseAttributes,
    ) -> Result<f64, ScoringFailure>;
}

/// Maps business-type text in a jurisdiction to an occupancy category.
#[async_trait]
pub trait OccupancyClassifier: Send + Sync {
    async fn classify(
        &self,
        business_type: &str,
        state_code: &str,
    ) -> Result<OccupancyResult, ClassificationFailure>;
}

/// The four collaborators a pipeline run depends on.
#[derive(Clone)]
pub struct PremiseServices {
    pub validator: Arc<dyn AddressValidator>,
    pub proximity: Arc<dyn ProximityMatcher>,
    pub scorer: Arc<dyn SimilarityScorer>,
    pub classifier: Arc<dyn OccupancyClassifier>,
}

impl PremiseServices {
    pub fn new(
        validator: Arc<dyn AddressValidator>,
        proximity: Arc<dyn ProximityMatcher>,
        scorer: Arc<dyn SimilarityScorer>,
        classifier: Arc<dyn OccupancyClassifier>,
    ) -> Self {
        Self {
            validator,
            proximity,
            scorer,
            classifier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("address validation service unreachable: {0}")]
    Unreachable(String),
    #[error("no address match found")]
    NoMatch,
    #[error("address confidence {confidence:.2} below minimum {minimum:.2}")]
    LowConfidence { confidence: f64, minimum: f64 },
}

impl ValidationFailure {
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::NoMatch => "no_match",
            Self::LowConfidence { .. } => "low_confidence",
        }
    }
}

impl Retryable for ValidationFailure {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Unreachable(format!("timed out after {}ms", after.as_millis()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProximityFailure {
    #[error("premises store unavailable: {0}")]
    Unavailable(String),
}

impl ProximityFailure {
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "proximity_unavailable",
        }
    }
}

impl Retryable for ProximityFailure {
    fn is_transient(&self) -> bool {
        true
    }

    fn timed_out(after: Duration) -> Self {
        Self::Unavailable(format!("timed out after {}ms", after.as_millis()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringFailure {
    #[error("similarity scoring unavailable: {0}")]
    Unavailable(String),
    /// The scorer answered, but not with a usable score. Asking again yields the same reply.
    #[error("similarity score unusable: {0}")]
    Unparseable(String),
}

impl ScoringFailure {
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "scoring_unavailable",
            Self::Unparseable(_) => "unparseable_score",
        }
    }
}

impl Retryable for ScoringFailure {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Unavailable(format!("timed out after {}ms", after.as_millis()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationFailure {
    #[error("no occupancy taxonomy for jurisdiction '{0}'")]
    UnsupportedJurisdiction(String),
    #[error("occupancy classification unavailable: {0}")]
    Unavailable(String),
}

impl ClassificationFailure {
    pub const fn cause(&self) -> &'static str {
        match self {
            Self::UnsupportedJurisdiction(_) => "unsupported_jurisdiction",
            Self::Unavailable(_) => "classification_unavailable",
        }
    }
}

impl Retryable for ClassificationFailure {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Unavailable(format!("timed out after {}ms", after.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_failures_are_not_retried() {
        assert!(!ValidationFailure::NoMatch.is_transient());
        assert!(!ValidationFailure::LowConfidence {
            confidence: 0.2,
            minimum: 0.5
        }
        .is_transient());
        assert!(!ClassificationFailure::UnsupportedJurisdiction("PR".to_string()).is_transient());
        assert!(!ScoringFailure::Unparseable("maybe".to_string()).is_transient());
    }

    #[test]
    fn network_failures_are_retried() {
        assert!(ValidationFailure::Unreachable("reset".to_string()).is_transient());
        assert!(ScoringFailure::Unavailable("503".to_string()).is_transient());
        assert!(ClassificationFailure::Unavailable("503".to_string()).is_transient());
        assert!(ProximityFailure::Unavailable("down".to_string()).is_transient());
    }

    #[test]
    fn timeouts_map_to_the_transient_variant() {
        let after = Duration::from_millis(1500);
        assert_eq!(ValidationFailure::timed_out(after).cause(), "unreachable");
        assert_eq!(ScoringFailure::timed_out(after).cause(), "scoring_unavailable");
        assert_eq!(
            ClassificationFailure::timed_out(after).cause(),
            "classification_unavailable"
        );
        assert!(ProximityFailure::timed_out(after)
            .to_string()
            .contains("1500ms"));
    }
}
