//! Google Places client: geocoding, text search and place details.
//!
//! All calls go through the legacy JSON web service endpoints, which report
//! failures in a `status` field rather than the HTTP status code.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;

/// Fields requested from the details endpoint.
const DETAIL_FIELDS: &str = "place_id,name,formatted_address,formatted_phone_number,\
international_phone_number,website,rating,user_ratings_total,address_components,geometry";

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Places API error ({status}): {message}")]
    Api { status: String, message: String },

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Google Places API key is not configured")]
    MissingKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// One hit from the text search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub formatted_address: Option<String>,
    pub geometry: Option<Geometry>,
}

/// Extended attributes from the details endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceDetails {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub formatted_phone_number: Option<String>,
    pub international_phone_number: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<i32>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub geometry: Option<Geometry>,
}

impl PlaceDetails {
    pub fn phone(&self) -> Option<&str> {
        self.formatted_phone_number
            .as_deref()
            .or(self.international_phone_number.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    /// Long name of the first component carrying any of `types`, in priority order.
    pub fn component(&self, types: &[&str]) -> Option<&AddressComponent> {
        types.iter().find_map(|t| {
            self.address_components
                .iter()
                .find(|c| c.types.iter().any(|ct| ct == t))
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    status: String,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsEnvelope {
    status: String,
    result: Option<PlaceDetails>,
    error_message: Option<String>,
}

/// Thin client over the Places web service. Cheap to clone.
#[derive(Clone)]
pub struct PlacesClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    radius_meters: u32,
}

impl PlacesClient {
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        radius_meters: u32,
        timeout: Duration,
    ) -> Result<Self, PlacesError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            radius_meters,
        })
    }

    /// False when no usable key is configured; discovery then serves sample data.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn radius_meters(&self) -> u32 {
        self.radius_meters
    }

    /// Resolves a city name to its centroid.
    pub async fn geocode(&self, city: &str) -> Result<LatLng, PlacesError> {
        let envelope: ListEnvelope<GeocodeResult> =
            self.get("geocode/json", &[("address", city)]).await?;
        match envelope.status.as_str() {
            "OK" => envelope
                .results
                .into_iter()
                .next()
                .map(|r| r.geometry.location)
                .ok_or_else(|| PlacesError::CityNotFound(city.to_string())),
            "ZERO_RESULTS" => Err(PlacesError::CityNotFound(city.to_string())),
            _ => Err(api_error(envelope.status, envelope.error_message)),
        }
    }

    /// Text search biased to `location` within the configured radius.
    pub async fn text_search(
        &self,
        query: &str,
        location: LatLng,
    ) -> Result<Vec<PlaceSummary>, PlacesError> {
        let location = format!("{},{}", location.lat, location.lng);
        let radius = self.radius_meters.to_string();
        let envelope: ListEnvelope<PlaceSummary> = self
            .get(
                "place/textsearch/json",
                &[("query", query), ("location", &location), ("radius", &radius)],
            )
            .await?;
        match envelope.status.as_str() {
            "OK" => Ok(envelope.results),
            "ZERO_RESULTS" => Ok(Vec::new()),
            _ => Err(api_error(envelope.status, envelope.error_message)),
        }
    }

    pub async fn details(&self, place_id: &str) -> Result<PlaceDetails, PlacesError> {
        let envelope: DetailsEnvelope = self
            .get(
                "place/details/json",
                &[("place_id", place_id), ("fields", DETAIL_FIELDS)],
            )
            .await?;
        if envelope.status == "OK" {
            if let Some(result) = envelope.result {
                return Ok(result);
            }
        }
        Err(api_error(envelope.status, envelope.error_message))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, PlacesError> {
        let key = self.api_key.as_deref().ok_or(PlacesError::MissingKey)?;
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Places request: {endpoint}");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", key)])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

fn api_error(status: String, message: Option<String>) -> PlacesError {
    PlacesError::Api {
        message: message.unwrap_or_else(|| format!("request failed with status {status}")),
        status,
    }
}
