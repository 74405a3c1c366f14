use serde::{Deserialize, Serialize};
use std::fmt;

/// Input line number of a record; stable for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a premise already held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PremiseId(pub i64);

impl fmt::Display for PremiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One input row exactly as read; never mutated after intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub row_id: RowId,
    pub business_name: String,
    pub business_type: String,
    pub address_line: String,
    pub city: String,
    pub state_code: String,
    pub postal_code: String,
}

impl RawRecord {
    /// Required address fields that are blank on this row.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.address_line.trim().is_empty() {
            missing.push("address");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.state_code.trim().is_empty() {
            missing.push("state");
        }
        missing
    }

    pub fn address_query(&self) -> AddressQuery {
        AddressQuery {
            business_name: self.business_name.trim().to_string(),
            address_line: self.address_line.trim().to_string(),
            city: self.city.trim().to_string(),
            state_code: self.state_code.trim().to_ascii_uppercase(),
            postal_code: self.postal_code.trim().to_string(),
        }
    }

    pub fn single_line_address(&self) -> String {
        format!(
            "{}, {}, {}",
            self.address_line.trim(),
            self.city.trim(),
            self.state_code.trim()
        )
    }
}

/// Raw address text handed to the address validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressQuery {
    pub business_name: String,
    pub address_line: String,
    pub city: String,
    pub state_code: String,
    pub postal_code: String,
}

impl AddressQuery {
    pub fn single_line(&self) -> String {
        let mut line = format!("{}, {}, {}", self.address_line, self.city, self.state_code);
        if !self.postal_code.is_empty() {
            line.push(' ');
            line.push_str(&self.postal_code);
        }
        line
    }
}

/// Normalized, geocoded address produced by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAddress {
    pub address_line: String,
    pub city: String,
    pub state_code: String,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Validation confidence in [0, 1].
    pub confidence: f64,
    /// Business name the geocoder matched at this address, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    /// Business category reported by the geocoder, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_type: Option<String>,
}

impl ValidatedAddress {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn single_line(&self) -> String {
        format!("{}, {}, {}", self.address_line, self.city, self.state_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A stored premise returned by the proximity lookup, with its distance from the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub premise_id: PremiseId,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub address: String,
    pub business_type: String,
    pub distance_km: f64,
}

impl Neighbor {
    pub fn attributes(&self) -> PremiseAttributes {
        PremiseAttributes {
            name: self.name.clone(),
            address: self.address.clone(),
            business_type: self.business_type.clone(),
        }
    }
}

/// The attributes compared by the similarity scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiseAttributes {
    pub name: String,
    pub address: String,
    pub business_type: String,
}

/// A scored pairing of the candidate record with one nearby stored premise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub neighbor: Neighbor,
    /// Similarity in [0, 1].
    pub score: f64,
}

impl CandidateMatch {
    pub fn new(neighbor: Neighbor, score: f64) -> Self {
        Self {
            neighbor,
            score: score.clamp(0.0, 1.0),
        }
    }

    pub fn premise_id(&self) -> PremiseId {
        self.neighbor.premise_id
    }

    pub fn distance_km(&self) -> f64 {
        self.neighbor.distance_km
    }
}

/// Occupancy category chosen for an accepted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyResult {
    pub category: String,
    /// Classifier confidence in [0, 1]; low values are accepted as-is.
    pub confidence: f64,
}

/// Pipeline stage at which a row stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Intake,
    AddressValidation,
    ProximityLookup,
    SimilarityScoring,
    Classification,
    OutputVerification,
}

impl FailureStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::AddressValidation => "address_validation",
            Self::ProximityLookup => "proximity_lookup",
            Self::SimilarityScoring => "similarity_scoring",
            Self::Classification => "classification",
            Self::OutputVerification => "output_verification",
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Self::Intake => 0,
            Self::AddressValidation => 1,
            Self::ProximityLookup => 2,
            Self::SimilarityScoring => 3,
            Self::Classification => 4,
            Self::OutputVerification => 5,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::AddressValidation,
            2 => Self::ProximityLookup,
            3 => Self::SimilarityScoring,
            4 => Self::Classification,
            5 => Self::OutputVerification,
            _ => Self::Intake,
        }
    }
}

/// Reason class reported for an errored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    InvalidAddress,
    MatchingUnavailable,
    ClassificationFailed,
    OutputInvalid,
    InternalError,
}

impl ErrorReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidAddress => "invalid_address",
            Self::MatchingUnavailable => "matching_unavailable",
            Self::ClassificationFailed => "classification_failed",
            Self::OutputInvalid => "output_invalid",
            Self::InternalError => "internal_error",
        }
    }
}

/// Diagnostic payload of an errored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub stage: FailureStage,
    pub reason: ErrorReason,
    /// Finer-grained cause code, e.g. `no_match` or `low_confidence`.
    pub cause: String,
    pub message: String,
}

impl RowError {
    pub fn new(
        stage: FailureStage,
        reason: ErrorReason,
        cause: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            reason,
            cause: cause.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({}): {}",
            self.reason.code(),
            self.stage.label(),
            self.cause,
            self.message
        )
    }
}

/// Terminal result of one row's run. Exactly one variant per record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Accepted {
        record: RawRecord,
        standardized_name: String,
        address: ValidatedAddress,
        occupancy: OccupancyResult,
        /// Best candidate that scored below the duplicate threshold, if scoring ran.
        #[serde(skip_serializing_if = "Option::is_none")]
        nearest_match: Option<CandidateMatch>,
    },
    Errored {
        record: RawRecord,
        error: RowError,
    },
    Duplicate {
        record: RawRecord,
        matched_premise_id: PremiseId,
        similarity: f64,
        distance_km: f64,
    },
}

impl RowOutcome {
    pub fn errored(record: RawRecord, error: RowError) -> Self {
        Self::Errored { record, error }
    }

    pub fn record(&self) -> &RawRecord {
        match self {
            Self::Accepted { record, .. }
            | Self::Errored { record, .. }
            | Self::Duplicate { record, .. } => record,
        }
    }

    pub fn row_id(&self) -> RowId {
        self.record().row_id
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Accepted { .. } => OutcomeKind::Accepted,
            Self::Errored { .. } => OutcomeKind::Errored,
            Self::Duplicate { .. } => OutcomeKind::Duplicate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Accepted,
    Errored,
    Duplicate,
}

impl OutcomeKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Errored => "errored",
            Self::Duplicate => "duplicate",
        }
    }
}
