use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use strsim::jaro_winkler;
use tracing::info;

use super::text::normalize_place;
use super::AdapterError;
use crate::workflows::premises::domain::OccupancyResult;
use crate::workflows::premises::services::{ClassificationFailure, OccupancyClassifier};

/// Confidence scale for a category chosen by name resemblance alone.
const RESEMBLANCE_CONFIDENCE: f64 = 0.2;

#[derive(Debug, Deserialize)]
struct TaxonomyRow {
    state_code: String,
    category: String,
    #[serde(default)]
    keywords: String,
}

/// One occupancy category allowed in a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyCategory {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Occupancy categories per state, in file order.
#[derive(Debug, Clone, Default)]
pub struct OccupancyTaxonomy {
    by_state: BTreeMap<String, Vec<OccupancyCategory>>,
}

impl OccupancyTaxonomy {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let taxonomy = Self::from_reader(file).map_err(|source| AdapterError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            jurisdictions = taxonomy.by_state.len(),
            "occupancy taxonomy loaded"
        );
        Ok(taxonomy)
    }

    /// Columns: `state_code,category,keywords` with keywords separated by `;`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut by_state: BTreeMap<String, Vec<OccupancyCategory>> = BTreeMap::new();
        for row in csv_reader.deserialize::<TaxonomyRow>() {
            let row = row?;
            let keywords = row
                .keywords
                .split(';')
                .map(normalize_place)
                .filter(|keyword| !keyword.is_empty())
                .collect();
            by_state
                .entry(row.state_code.to_ascii_uppercase())
                .or_default()
                .push(OccupancyCategory {
                    name: row.category,
                    keywords,
                });
        }

        Ok(Self { by_state })
    }

    pub fn categories(&self, state_code: &str) -> Option<&[OccupancyCategory]> {
        self.by_state
            .get(&state_code.to_ascii_uppercase())
            .map(Vec::as_slice)
            .filter(|categories| !categories.is_empty())
    }

    /// The state's categories, or `UnsupportedJurisdiction`.
    pub fn require(&self, state_code: &str) -> Result<&[OccupancyCategory], ClassificationFailure> {
        self.categories(state_code)
            .ok_or_else(|| ClassificationFailure::UnsupportedJurisdiction(state_code.to_string()))
    }
}

/// Offline classifier: keyword hits decide the category; with no hits the closest
/// category name is chosen at low confidence.
#[derive(Debug, Clone)]
pub struct KeywordOccupancyClassifier {
    taxonomy: Arc<OccupancyTaxonomy>,
}

impl KeywordOccupancyClassifier {
    pub fn new(taxonomy: Arc<OccupancyTaxonomy>) -> Self {
        Self { taxonomy }
    }

    fn choose(categories: &[OccupancyCategory], business_type: &str) -> OccupancyResult {
        let text = format!(" {} ", normalize_place(business_type));

        let mut best: Option<(&OccupancyCategory, usize)> = None;
        for category in categories {
            let hits = category
                .keywords
                .iter()
                .filter(|keyword| text.contains(&format!(" {keyword} ")))
                .count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((category, hits));
            }
        }

        if let Some((category, hits)) = best {
            return OccupancyResult {
                category: category.name.clone(),
                confidence: (0.6 + 0.2 * (hits as f64 - 1.0)).min(1.0),
            };
        }

        let text = text.trim();
        let mut closest: Option<(&OccupancyCategory, f64)> = None;
        for category in categories {
            let similarity = jaro_winkler(text, &normalize_place(&category.name));
            if closest.map_or(true, |(_, top)| similarity > top) {
                closest = Some((category, similarity));
            }
        }

        match closest {
            Some((category, similarity)) => OccupancyResult {
                category: category.name.clone(),
                confidence: similarity * RESEMBLANCE_CONFIDENCE,
            },
            None => OccupancyResult {
                category: String::new(),
                confidence: 0.0,
            },
        }
    }
}

#[async_trait]
impl OccupancyClassifier for KeywordOccupancyClassifier {
    async fn classify(
        &self,
        business_type: &str,
        state_code: &str,
    ) -> Result<OccupancyResult, ClassificationFailure> {
        let categories = self.taxonomy.require(state_code)?;
        Ok(Self::choose(categories, business_type))
    }
}
