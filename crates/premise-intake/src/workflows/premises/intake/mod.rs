mod normalizer;
mod parser;

use std::io::Read;
use std::path::Path;

use tracing::info;

use super::domain::RawRecord;

#[derive(Debug)]
pub enum IntakeError {
    Io(std::io::Error),
    Csv(csv::Error),
    UnrecognizedHeader(Vec<String>),
}

impl std::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntakeError::Io(err) => write!(f, "failed to read premises input: {}", err),
            IntakeError::Csv(err) => write!(f, "invalid premises CSV data: {}", err),
            IntakeError::UnrecognizedHeader(headers) => write!(
                f,
                "no address, city, or state column found in header [{}]",
                headers.join(", ")
            ),
        }
    }
}

impl std::error::Error for IntakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IntakeError::Io(err) => Some(err),
            IntakeError::Csv(err) => Some(err),
            IntakeError::UnrecognizedHeader(_) => None,
        }
    }
}

impl From<std::io::Error> for IntakeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for IntakeError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads premises CSVs whose column names and order vary between sources.
pub struct PremiseCsvReader;

impl PremiseCsvReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>, IntakeError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Row ids are the 1-based input line of each record, header included.
    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<RawRecord>, IntakeError> {
        let parsed = parser::parse_records(reader)?;
        if parsed.columns.lacks_address_columns() {
            return Err(IntakeError::UnrecognizedHeader(parsed.headers));
        }

        info!(records = parsed.records.len(), "premises input loaded");
        Ok(parsed.records)
    }
}
