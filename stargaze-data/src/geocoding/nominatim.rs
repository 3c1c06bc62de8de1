//! Place name lookup through Nominatim's search API.
//!
//! See: <https://nominatim.org/release-docs/latest/api/Search/>

use serde::Deserialize;
use stargaze_core::Coordinates;

use super::{GeocodeError, Geocoder};
use crate::http::{BlockingClient, ClientBuildError, HttpSourceConfig, SourceError};

/// Public Nominatim search endpoint.
pub const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// One search hit. Nominatim encodes coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// [`Geocoder`] backed by a Nominatim instance.
#[derive(Debug)]
pub struct NominatimClient {
    inner: BlockingClient,
}

impl NominatimClient {
    /// Create a client for the public Nominatim service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new() -> Result<Self, ClientBuildError> {
        Self::with_config(&HttpSourceConfig::new(DEFAULT_NOMINATIM_ENDPOINT))
    }

    /// Create a client with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a URL or if the HTTP client or
    /// Tokio runtime fails to build.
    pub fn with_config(config: &HttpSourceConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            inner: BlockingClient::new(config)?,
        })
    }

    fn build_url(&self, query: &str) -> url::Url {
        let mut url = self.inner.endpoint().clone();
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("limit", "1")
            .append_pair("q", query);
        url
    }

    async fn search(&self, url: &url::Url) -> Result<Vec<Place>, SourceError> {
        let label = url.as_str();
        self.inner
            .client()
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.inner.convert_error(&err, label))?
            .error_for_status()
            .map_err(|err| self.inner.convert_error(&err, label))?
            .json::<Vec<Place>>()
            .await
            .map_err(|err| SourceError::Decode {
                url: label.to_owned(),
                message: err.to_string(),
            })
    }
}

impl Geocoder for NominatimClient {
    fn geocode(&self, query: &str) -> Result<Coordinates, GeocodeError> {
        let url = self.build_url(query);
        log::debug!("geocoding `{query}` with {}", self.inner.endpoint());
        let places = self.inner.block_on(url.as_str(), self.search(&url))?;
        let not_found = || GeocodeError::NotFound {
            query: query.to_owned(),
        };
        let place = places.first().ok_or_else(not_found)?;
        let (Ok(lat), Ok(lon)) = (place.lat.parse::<f64>(), place.lon.parse::<f64>()) else {
            return Err(SourceError::Decode {
                url: url.to_string(),
                message: format!("unparseable coordinates {:?}, {:?}", place.lat, place.lon),
            }
            .into());
        };
        Ok(Coordinates::new(lat, lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::loopback::serve_once;
    use rstest::rstest;

    fn client(base: &str) -> NominatimClient {
        NominatimClient::with_config(&HttpSourceConfig::new(format!("{base}/search")))
            .expect("client should build")
    }

    #[rstest]
    fn url_carries_search_parameters() {
        let url = NominatimClient::new()
            .expect("client should build")
            .build_url("Kraków");
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/search?format=jsonv2&limit=1&q=Krak%C3%B3w"
        );
    }

    #[rstest]
    fn first_hit_is_used() {
        let (base, server) = serve_once(
            "200 OK",
            r#"[{"lat": "50.0619474", "lon": "19.9368564", "display_name": "Kraków"}]"#,
        );
        let coordinates = client(&base).geocode("Kraków").expect("geocode");
        assert_eq!(coordinates, Coordinates::new(50.061_947_4, 19.936_856_4));
        let request = server.join().expect("server thread");
        assert!(request.starts_with("GET /search?format=jsonv2&limit=1&q=Krak%C3%B3w"));
        assert!(request.to_ascii_lowercase().contains("user-agent: stargaze/"));
    }

    #[rstest]
    fn empty_result_is_not_found() {
        let (base, server) = serve_once("200 OK", "[]");
        let err = client(&base).geocode("Atlantis").expect_err("no hits");
        assert!(matches!(err, GeocodeError::NotFound { ref query } if query == "Atlantis"));
        server.join().expect("server thread");
    }

    #[rstest]
    fn server_error_is_propagated() {
        let (base, server) = serve_once("503 Service Unavailable", "busy");
        let err = client(&base).geocode("Kraków").expect_err("unavailable");
        assert!(matches!(
            err,
            GeocodeError::Source(SourceError::Http { status: 503, .. })
        ));
        server.join().expect("server thread");
    }
}
