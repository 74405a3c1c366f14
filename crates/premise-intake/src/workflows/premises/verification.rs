use std::sync::OnceLock;

use regex::Regex;

use super::domain::{OccupancyResult, ValidatedAddress};

fn state_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2}$").expect("state code pattern compiles"))
}

fn postal_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("postal code pattern compiles"))
}

/// Problems found on an accepted row before it is handed to the writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("output validation failed: {}", problems.join("; "))]
pub struct VerificationFailure {
    pub problems: Vec<String>,
}

/// Checks that an accepted row is complete and well-formed for export.
pub fn verify_accepted(
    standardized_name: &str,
    address: &ValidatedAddress,
    occupancy: &OccupancyResult,
) -> Result<(), VerificationFailure> {
    let mut problems = Vec::new();

    for (field, value) in [
        ("premise name", standardized_name),
        ("address line", address.address_line.as_str()),
        ("city", address.city.as_str()),
        ("state", address.state_code.as_str()),
        ("postal code", address.postal_code.as_str()),
        ("occupancy", occupancy.category.as_str()),
    ] {
        if value.trim().is_empty() {
            problems.push(format!("missing required field: {field}"));
        }
    }

    let (lat, lng) = (address.latitude, address.longitude);
    if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
        problems.push(format!("invalid latitude: {lat}"));
    }
    if !(lng.is_finite() && (-180.0..=180.0).contains(&lng)) {
        problems.push(format!("invalid longitude: {lng}"));
    }
    if lat == 0.0 && lng == 0.0 {
        problems.push("coordinates are 0,0".to_string());
    }

    if !address.state_code.is_empty() && !state_code_pattern().is_match(&address.state_code) {
        problems.push(format!("invalid state code: {}", address.state_code));
    }
    if !address.postal_code.is_empty() && !postal_code_pattern().is_match(&address.postal_code) {
        problems.push(format!("invalid postal code: {}", address.postal_code));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(VerificationFailure { problems })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ValidatedAddress {
        ValidatedAddress {
            address_line: "1860 Millertown Rd".to_string(),
            city: "Auburn".to_string(),
            state_code: "CA".to_string(),
            postal_code: "95603".to_string(),
            latitude: 38.9,
            longitude: -121.07,
            confidence: 1.0,
            place_name: None,
            place_type: None,
        }
    }

    fn occupancy() -> OccupancyResult {
        OccupancyResult {
            category: "Mercantile".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn complete_row_passes() {
        assert!(verify_accepted("Schenes", &address(), &occupancy()).is_ok());

        let mut plus_four = address();
        plus_four.postal_code = "95603-1234".to_string();
        assert!(verify_accepted("Schenes", &plus_four, &occupancy()).is_ok());
    }

    #[test]
    fn reports_every_problem_found() {
        let mut bad = address();
        bad.postal_code = "9560".to_string();
        bad.state_code = "Ca".to_string();
        bad.latitude = 0.0;
        bad.longitude = 0.0;

        let failure = verify_accepted("", &bad, &occupancy()).expect_err("row is invalid");
        assert_eq!(failure.problems.len(), 4);
        assert!(failure.to_string().contains("missing required field: premise name"));
        assert!(failure.to_string().contains("coordinates are 0,0"));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let mut bad = address();
        bad.latitude = 91.0;
        bad.longitude = -181.0;
        let failure = verify_accepted("Schenes", &bad, &occupancy()).expect_err("row is invalid");
        assert_eq!(failure.problems.len(), 2);
    }

    #[test]
    fn missing_postal_code_is_reported_once() {
        let mut bad = address();
        bad.postal_code.clear();
        let failure = verify_accepted("Schenes", &bad, &occupancy()).expect_err("row is invalid");
        assert_eq!(
            failure.problems,
            vec!["missing required field: postal code".to_string()]
        );
    }
}
