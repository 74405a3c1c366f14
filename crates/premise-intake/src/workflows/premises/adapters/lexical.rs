use async_trait::async_trait;
use strsim::jaro_winkler;

use super::text::{normalize_business_name, normalize_place, normalize_street};
use crate::workflows::premises::domain::PremiseAttributes;
use crate::workflows::premises::services::{ScoringFailure, SimilarityScorer};

const NAME_WEIGHT: f64 = 0.7;
const ADDRESS_WEIGHT: f64 = 0.2;
const TYPE_WEIGHT: f64 = 0.1;
/// Used when one side has no business type to compare.
const UNKNOWN_TYPE_SIMILARITY: f64 = 0.5;

/// Offline scorer: weighted Jaro-Winkler over normalized name, address, and type.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalSimilarityScorer;

impl LexicalSimilarityScorer {
    pub fn compare(candidate: &PremiseAttributes, neighbor: &PremiseAttributes) -> f64 {
        let name = jaro_winkler(
            &normalize_business_name(&candidate.name),
            &normalize_business_name(&neighbor.name),
        );
        let address = jaro_winkler(
            &normalize_street(&candidate.address),
            &normalize_street(&neighbor.address),
        );

        let candidate_type = normalize_place(&candidate.business_type);
        let neighbor_type = normalize_place(&neighbor.business_type);
        let business_type = if candidate_type.is_empty() || neighbor_type.is_empty() {
            UNKNOWN_TYPE_SIMILARITY
        } else {
            jaro_winkler(&candidate_type, &neighbor_type)
        };

        (NAME_WEIGHT * name + ADDRESS_WEIGHT * address + TYPE_WEIGHT * business_type)
            .clamp(0.0, 1.0)
    }
}

#[async_trait]
impl SimilarityScorer for LexicalSimilarityScorer {
    async fn score(
        &self,
        candidate: &PremiseAttributes,
        neighbor: &PremiseAttributes,
    ) -> Result<f64, ScoringFailure> {
        Ok(Self::compare(candidate, neighbor))
    }
}
