use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::AdapterError;
use crate::workflows::premises::domain::{Coordinates, Neighbor, PremiseAttributes, PremiseId};
use crate::workflows::premises::matching::{nearest_within, StoredPremise};
use crate::workflows::premises::services::{ProximityFailure, ProximityMatcher};

#[derive(Debug, Deserialize)]
struct StoreRow {
    #[serde(alias = "Id")]
    id: i64,
    #[serde(alias = "Premise Name")]
    premise_name: String,
    #[serde(default, alias = "Address Line 1")]
    address_line_1: String,
    #[serde(default, alias = "City")]
    city: String,
    #[serde(default, alias = "State")]
    state_code: String,
    #[serde(default, alias = "Latitude")]
    latitude: Option<f64>,
    #[serde(default, alias = "Longitude")]
    longitude: Option<f64>,
    #[serde(default, alias = "Premise Occupancy")]
    business_type: String,
}

/// Read-only snapshot of the stored premises, searched by great-circle distance.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPremiseStore {
    premises: Vec<StoredPremise>,
}

impl InMemoryPremiseStore {
    pub fn new(premises: Vec<StoredPremise>) -> Self {
        Self { premises }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_reader(file).map_err(|source| AdapterError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), premises = store.len(), "premises store loaded");
        Ok(store)
    }

    /// Rows without coordinates cannot be matched and are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut premises = Vec::new();

        for row in csv_reader.deserialize::<StoreRow>() {
            let row = row?;
            let (Some(latitude), Some(longitude)) = (row.latitude, row.longitude) else {
                debug!(premise_id = row.id, "skipping stored premise without coordinates");
                continue;
            };

            let address = [
                row.address_line_1.as_str(),
                row.city.as_str(),
                row.state_code.as_str(),
            ]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", ");

            premises.push(StoredPremise {
                premise_id: PremiseId(row.id),
                coordinates: Coordinates {
                    latitude,
                    longitude,
                },
                attributes: PremiseAttributes {
                    name: row.premise_name,
                    address,
                    business_type: row.business_type,
                },
            });
        }

        Ok(Self { premises })
    }

    pub fn len(&self) -> usize {
        self.premises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.premises.is_empty()
    }
}

#[async_trait]
impl ProximityMatcher for InMemoryPremiseStore {
    async fn nearest(
        &self,
        origin: Coordinates,
        radius_km: f64,
        max_k: usize,
    ) -> Result<Vec<Neighbor>, ProximityFailure> {
        Ok(nearest_within(&self.premises, origin, radius_km, max_k))
    }
}
