//! HTTP-backed [`FeatureSource`] talking to an Overpass interpreter.

use crate::http::{BlockingClient, ClientBuildError, HttpSourceConfig, SourceError};

use super::{FeatureSource, OverpassResponse};

/// Public Overpass interpreter endpoint.
pub const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Overpass client that POSTs query text to the interpreter.
///
/// # Examples
/// ```no_run
/// use stargaze_core::BoundingBox;
/// use stargaze_data::overpass::{FeatureSource, HttpOverpassClient, OverpassQuery};
///
/// let client = HttpOverpassClient::new()?;
/// let bounds = BoundingBox::new(49.98, 18.48, 50.02, 18.52)?;
/// let query = OverpassQuery::new(bounds).way("highway", "track");
/// let response = client.query(&query.to_string())?;
/// println!("{} elements", response.elements.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct HttpOverpassClient {
    inner: BlockingClient,
}

impl HttpOverpassClient {
    /// Create a client for the public interpreter.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new() -> Result<Self, ClientBuildError> {
        Self::with_config(&HttpSourceConfig::new(DEFAULT_OVERPASS_ENDPOINT))
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

    async fn query_async(&self, query: &str) -> Result<OverpassResponse, SourceError> {
        let url = self.inner.endpoint().as_str();
        let response = self
            .inner
            .client()
            .post(url)
            .body(query.to_owned())
            .send()
            .await
            .map_err(|err| self.inner.convert_error(&err, url))?
            .error_for_status()
            .map_err(|err| self.inner.convert_error(&err, url))?;

        response
            .json::<OverpassResponse>()
            .await
            .map_err(|err| SourceError::Decode {
                url: url.to_owned(),
                message: err.to_string(),
            })
    }
}

impl FeatureSource for HttpOverpassClient {
    fn query(&self, query: &str) -> Result<OverpassResponse, SourceError> {
        let url = self.inner.endpoint().as_str();
        log::debug!("sending Overpass query to {url}");
        self.inner.block_on(url, self.query_async(query))
    }
}
