use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::text::{normalize_place, normalize_street};
use super::AdapterError;
use crate::workflows::premises::domain::{AddressQuery, ValidatedAddress};
use crate::workflows::premises::services::{AddressValidator, ValidationFailure};

const EXACT_CONFIDENCE: f64 = 1.0;
const CITY_MISMATCH_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct GazetteerRow {
    address_line: String,
    city: String,
    state_code: String,
    #[serde(default)]
    postal_code: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    place_name: Option<String>,
    #[serde(default)]
    place_type: Option<String>,
}

/// Offline address validation against a reference list of known addresses.
#[derive(Debug, Clone, Default)]
pub struct GazetteerValidator {
    entries: Vec<GazetteerRow>,
    by_street_city_state: HashMap<(String, String, String), usize>,
    by_street_state: HashMap<(String, String), usize>,
}

impl GazetteerValidator {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| AdapterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let gazetteer = Self::from_reader(file).map_err(|source| AdapterError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), entries = gazetteer.len(), "gazetteer loaded");
        Ok(gazetteer)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut gazetteer = Self::default();
        for row in csv_reader.deserialize::<GazetteerRow>() {
            gazetteer.insert(row?);
        }
        Ok(gazetteer)
    }

    fn insert(&mut self, row: GazetteerRow) {
        let index = self.entries.len();
        let street = normalize_street(&row.address_line);
        let city = normalize_place(&row.city);
        let state = row.state_code.to_ascii_uppercase();

        self.by_street_city_state
            .entry((street.clone(), city, state.clone()))
            .or_insert(index);
        self.by_street_state.entry((street, state)).or_insert(index);
        self.entries.push(row);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, query: &AddressQuery) -> Option<(&GazetteerRow, f64)> {
        let street = normalize_street(&query.address_line);
        let city = normalize_place(&query.city);
        let state = query.state_code.to_ascii_uppercase();

        if let Some(&index) =
            self.by_street_city_state
                .get(&(street.clone(), city, state.clone()))
        {
            return Some((&self.entries[index], EXACT_CONFIDENCE));
        }

        self.by_street_state
            .get(&(street, state))
            .map(|&index| (&self.entries[index], CITY_MISMATCH_CONFIDENCE))
    }
}

#[async_trait]
impl AddressValidator for GazetteerValidator {
    async fn validate(&self, query: &AddressQuery) -> Result<ValidatedAddress, ValidationFailure> {
        let (entry, confidence) = self.lookup(query).ok_or(ValidationFailure::NoMatch)?;

        Ok(ValidatedAddress {
            address_line: entry.address_line.clone(),
            city: entry.city.clone(),
            state_code: entry.state_code.to_ascii_uppercase(),
            postal_code: entry.postal_code.clone(),
            latitude: entry.latitude,
            longitude: entry.longitude,
            confidence,
            place_name: entry.place_name.clone().filter(|name| !name.is_empty()),
            place_type: entry.place_type.clone().filter(|kind| !kind.is_empty()),
        })
    }
}
