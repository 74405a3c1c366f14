use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::trace;

use super::AdapterError;
use crate::workflows::premises::domain::{AddressQuery, ValidatedAddress};
use crate::workflows::premises::services::{AddressValidator, ValidationFailure};

/// Result types too generic to describe the business at the address.
const GENERIC_PLACE_TYPES: [&str; 6] = [
    "street_address",
    "premise",
    "subpremise",
    "establishment",
    "point_of_interest",
    "route",
];

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub geometry: Geometry,
    #[serde(default)]
    pub partial_match: bool,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
    #[serde(default)]
    pub location_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

fn location_confidence(location_type: &str) -> f64 {
    match location_type {
        "ROOFTOP" => 1.0,
        "RANGE_INTERPOLATED" => 0.8,
        "GEOMETRIC_CENTER" => 0.6,
        _ => 0.4,
    }
}

/// Maps a geocoding reply to a validated address, using the first result only.
pub fn parse_geocode_response(
    response: GeocodeResponse,
) -> Result<ValidatedAddress, ValidationFailure> {
    match response.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" | "INVALID_REQUEST" => return Err(ValidationFailure::NoMatch),
        status => {
            let detail = response.error_message.unwrap_or_default();
            return Err(ValidationFailure::Unreachable(
                format!("geocoding status {status} {detail}").trim().to_string(),
            ));
        }
    }

    let result = response
        .results
        .into_iter()
        .next()
        .ok_or(ValidationFailure::NoMatch)?;

    let component = |kind: &str, short: bool| {
        result
            .address_components
            .iter()
            .find(|component| component.types.iter().any(|t| t == kind))
            .map(|component| {
                if short {
                    component.short_name.clone()
                } else {
                    component.long_name.clone()
                }
            })
    };

    let street_number = component("street_number", false);
    let route = component("route", false);
    let address_line = match (street_number, route) {
        (Some(number), Some(route)) => format!("{number} {route}"),
        (None, Some(route)) => route,
        _ => result
            .formatted_address
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    };

    let city = component("locality", false)
        .or_else(|| component("postal_town", false))
        .or_else(|| component("sublocality", false))
        .unwrap_or_default();
    let state_code = component("administrative_area_level_1", true).unwrap_or_default();
    let postal_code = component("postal_code", false).unwrap_or_default();
    let place_name = component("establishment", false)
        .or_else(|| component("point_of_interest", false));
    let place_type = result
        .types
        .iter()
        .find(|kind| !GENERIC_PLACE_TYPES.contains(&kind.as_str()))
        .map(|kind| kind.replace('_', " "));

    let mut confidence = location_confidence(&result.geometry.location_type);
    if result.partial_match {
        confidence *= 0.75;
    }

    Ok(ValidatedAddress {
        address_line,
        city,
        state_code,
        postal_code,
        latitude: result.geometry.location.lat,
        longitude: result.geometry.location.lng,
        confidence,
        place_name,
        place_type,
    })
}

/// Remote address validation through a Google-style geocoding JSON endpoint.
pub struct GeocodingValidator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeocodingValidator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AdapterError::HttpClient)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl AddressValidator for GeocodingValidator {
    async fn validate(&self, query: &AddressQuery) -> Result<ValidatedAddress, ValidationFailure> {
        let address = query.single_line();
        let url = format!("{}/maps/api/geocode/json", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("address", address.as_str()),
                ("components", "country:US"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ValidationFailure::Unreachable(err.to_string()))?
            .error_for_status()
            .map_err(|err| ValidationFailure::Unreachable(err.to_string()))?;

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|err| ValidationFailure::Unreachable(format!("malformed reply: {err}")))?;
        trace!(status = %body.status, results = body.results.len(), "geocoding reply");

        parse_geocode_response(body)
    }
}
