use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::batch::BatchResult;
use super::domain::RowOutcome;

pub const ACCEPTED_FILE: &str = "processed_premises.csv";
pub const ERRORS_FILE: &str = "errors.csv";
pub const DUPLICATES_FILE: &str = "duplicates.csv";

const ACCEPTED_HEADERS: [&str; 16] = [
    "Row Id",
    "Premise Name",
    "Address Line 1",
    "City",
    "State",
    "Postal Code",
    "Country",
    "Country ShortName",
    "Status",
    "Latitude",
    "Longitude",
    "Premise Occupancy",
    "Occupancy Confidence",
    "Address Confidence",
    "Nearest Premise Id",
    "Nearest Similarity",
];

const ERROR_HEADERS: [&str; 10] = [
    "Row Id",
    "Business Name",
    "Address",
    "City",
    "State",
    "Postal Code",
    "Stage",
    "Reason",
    "Cause",
    "Message",
];

const DUPLICATE_HEADERS: [&str; 9] = [
    "Row Id",
    "Business Name",
    "Address",
    "City",
    "State",
    "Postal Code",
    "Matched Premise Id",
    "Similarity",
    "Distance Km",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write premises output: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode premises output: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Serialize)]
struct AcceptedRow<'a> {
    row_id: u64,
    premise_name: &'a str,
    address_line: &'a str,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    country: &'static str,
    country_short_name: &'static str,
    status: &'static str,
    latitude: f64,
    longitude: f64,
    occupancy: &'a str,
    occupancy_confidence: f64,
    address_confidence: f64,
    nearest_premise_id: Option<i64>,
    nearest_similarity: Option<f64>,
}

#[derive(Serialize)]
struct ErrorRow<'a> {
    row_id: u64,
    business_name: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    stage: &'static str,
    reason: &'static str,
    cause: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct DuplicateRow<'a> {
    row_id: u64,
    business_name: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    matched_premise_id: i64,
    similarity: f64,
    distance_km: f64,
}

/// Paths written by [`OutcomeWriter::write_to_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub accepted: PathBuf,
    pub errors: PathBuf,
    pub duplicates: PathBuf,
}

/// Writes each partition as its own CSV. Every file gets a header row, even when empty.
pub struct OutcomeWriter;

impl OutcomeWriter {
    pub fn write_to_dir<P: AsRef<Path>>(
        dir: P,
        result: &BatchResult,
    ) -> Result<ExportPaths, ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let paths = ExportPaths {
            accepted: dir.join(ACCEPTED_FILE),
            errors: dir.join(ERRORS_FILE),
            duplicates: dir.join(DUPLICATES_FILE),
        };

        Self::write_accepted(File::create(&paths.accepted)?, &result.accepted)?;
        Self::write_errors(File::create(&paths.errors)?, &result.errored)?;
        Self::write_duplicates(File::create(&paths.duplicates)?, &result.duplicates)?;
        Ok(paths)
    }

    pub fn write_accepted<W: Write>(writer: W, outcomes: &[RowOutcome]) -> Result<(), ExportError> {
        let mut csv_writer = headed_writer(writer, &ACCEPTED_HEADERS)?;
        for outcome in outcomes {
            if let RowOutcome::Accepted {
                record,
                standardized_name,
                address,
                occupancy,
                nearest_match,
            } = outcome
            {
                csv_writer.serialize(AcceptedRow {
                    row_id: record.row_id.0,
                    premise_name: standardized_name,
                    address_line: &address.address_line,
                    city: &address.city,
                    state: &address.state_code,
                    postal_code: &address.postal_code,
                    country: "USA",
                    country_short_name: "US",
                    status: "Active",
                    latitude: address.latitude,
                    longitude: address.longitude,
                    occupancy: &occupancy.category,
                    occupancy_confidence: occupancy.confidence,
                    address_confidence: address.confidence,
                    nearest_premise_id: nearest_match.as_ref().map(|best| best.premise_id().0),
                    nearest_similarity: nearest_match.as_ref().map(|best| best.score),
                })?;
            }
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_errors<W: Write>(writer: W, outcomes: &[RowOutcome]) -> Result<(), ExportError> {
        let mut csv_writer = headed_writer(writer, &ERROR_HEADERS)?;
        for outcome in outcomes {
            if let RowOutcome::Errored { record, error } = outcome {
                csv_writer.serialize(ErrorRow {
                    row_id: record.row_id.0,
                    business_name: &record.business_name,
                    address: &record.address_line,
                    city: &record.city,
                    state: &record.state_code,
                    postal_code: &record.postal_code,
                    stage: error.stage.label(),
                    reason: error.reason.code(),
                    cause: &error.cause,
                    message: &error.message,
                })?;
            }
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_duplicates<W: Write>(
        writer: W,
        outcomes: &[RowOutcome],
    ) -> Result<(), ExportError> {
        let mut csv_writer = headed_writer(writer, &DUPLICATE_HEADERS)?;
        for outcome in outcomes {
            if let RowOutcome::Duplicate {
                record,
                matched_premise_id,
                similarity,
                distance_km,
            } = outcome
            {
                csv_writer.serialize(DuplicateRow {
                    row_id: record.row_id.0,
                    business_name: &record.business_name,
                    address: &record.address_line,
                    city: &record.city,
                    state: &record.state_code,
                    postal_code: &record.postal_code,
                    matched_premise_id: matched_premise_id.0,
                    similarity: *similarity,
                    distance_km: *distance_km,
                })?;
            }
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn headed_writer<W: Write>(writer: W, headers: &[&str]) -> Result<csv::Writer<W>, ExportError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(headers)?;
    Ok(csv_writer)
}
