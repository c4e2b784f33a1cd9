//! Best-effort reverse geocoding of reported coordinates.
//!
//! The lookup is never load-bearing: every failure mode (no endpoint
//! configured, network error, bad status, unreadable body, nothing known
//! for the coordinates) degrades to "no address". The caller runs it off
//! the update path so the coordinate broadcast never waits on it.

use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The field we read from a Nominatim-style `/reverse` response.
#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: Option<String>,
}

/// Client for an external reverse-geocoding service.
#[derive(Debug, Clone)]
pub struct Geocoder {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl Geocoder {
    /// A geocoder backed by a Nominatim-compatible `/reverse` endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Some(endpoint.into()),
        }
    }

    /// A geocoder that never resolves anything, for deployments without a
    /// geocoding service.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Resolves coordinates to a human-readable address, or `None`.
    pub async fn reverse(&self, latitude: f64, longitude: f64) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?;

        let result = self
            .client
            .get(endpoint)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("format", "jsonv2")])
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Reverse geocoding request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Reverse geocoding returned {}", response.status());
            return None;
        }

        match response.json::<ReverseResponse>().await {
            Ok(body) => {
                if body.display_name.is_none() {
                    debug!("No address known for ({}, {})", latitude, longitude);
                }
                body.display_name
            }
            Err(e) => {
                warn!("Reverse geocoding response unreadable: {}", e);
                None
            }
        }
    }
}
