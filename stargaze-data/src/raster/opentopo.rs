//! OpenTopography global DEM client.
//!
//! See: <https://portal.opentopography.org/apidocs/#/Public/getGlobalDem>

use futures_util::StreamExt;
use stargaze_core::BoundingBox;

use super::RasterSource;
use crate::http::{BlockingClient, ClientBuildError, HttpSourceConfig, SourceError};

/// Global DEM endpoint of the OpenTopography API.
pub const DEFAULT_OPENTOPO_ENDPOINT: &str = "https://portal.opentopography.org/API/globaldem";

/// 30 metre SRTM elevation model.
const DEFAULT_DATASET: &str = "SRTMGL1";

const DEFAULT_OUTPUT_FORMAT: &str = "GTiff";

/// Rasters larger than this are rejected rather than buffered.
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Configuration for [`HttpOpenTopoClient`].
#[derive(Debug, Clone)]
pub struct OpenTopoConfig {
    /// Endpoint, timeout and user agent.
    pub http: HttpSourceConfig,
    /// API key sent as `API_Key`.
    pub api_key: Option<String>,
    /// Dataset sent as `demtype`.
    pub dataset: String,
    /// Raster format sent as `outputFormat`.
    pub output_format: String,
    /// Largest accepted payload.
    pub max_payload_bytes: usize,
}

impl Default for OpenTopoConfig {
    fn default() -> Self {
        Self {
            http: HttpSourceConfig::new(DEFAULT_OPENTOPO_ENDPOINT),
            api_key: None,
            dataset: DEFAULT_DATASET.to_owned(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_owned(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl OpenTopoConfig {
    /// Create a configuration for `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpSourceConfig::new(endpoint),
            ..Self::default()
        }
    }

    /// Replace the connection settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpSourceConfig) -> Self {
        self.http = http;
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the dataset name.
    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    /// Set the payload size limit.
    #[must_use]
    pub const fn with_max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }
}

/// HTTP-backed [`RasterSource`] for OpenTopography.
#[derive(Debug)]
pub struct HttpOpenTopoClient {
    inner: BlockingClient,
    config: OpenTopoConfig,
}

impl HttpOpenTopoClient {
    /// Create a client with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a URL or if the HTTP client or
    /// Tokio runtime fails to build.
    pub fn with_config(config: OpenTopoConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            inner: BlockingClient::new(&config.http)?,
            config,
        })
    }

    /// Build the request URL for `bounds`.
    fn build_url(&self, bounds: &BoundingBox) -> url::Url {
        let mut url = self.inner.endpoint().clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("south", &bounds.minlat().to_string())
                .append_pair("north", &bounds.maxlat().to_string())
                .append_pair("west", &bounds.minlon().to_string())
                .append_pair("east", &bounds.maxlon().to_string())
                .append_pair("demtype", &self.config.dataset)
                .append_pair("outputFormat", &self.config.output_format);
            if let Some(key) = &self.config.api_key {
                pairs.append_pair("API_Key", key);
            }
        }
        url
    }

    async fn fetch_async(&self, url: &url::Url) -> Result<Vec<u8>, SourceError> {
        let label = redact(url);
        let response = self
            .inner
            .client()
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.inner.convert_error(&err, &label))?
            .error_for_status()
            .map_err(|err| self.inner.convert_error(&err, &label))?;

        let limit = self.config.max_payload_bytes;
        let mut payload = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|err| self.inner.convert_error(&err, &label))?;
            if payload.len() + chunk.len() > limit {
                return Err(SourceError::PayloadTooLarge { url: label, limit });
            }
            payload.extend_from_slice(&chunk);
        }
        if payload.is_empty() {
            return Err(SourceError::EmptyPayload { url: label });
        }
        Ok(payload)
    }
}

/// URL with the API key stripped, safe for logs and errors.
fn redact(url: &url::Url) -> String {
    let mut clean = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "API_Key")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    clean.query_pairs_mut().clear().extend_pairs(kept);
    clean.to_string()
}

impl RasterSource for HttpOpenTopoClient {
    fn fetch_raster(&self, bounds: &BoundingBox) -> Result<Vec<u8>, SourceError> {
        let url = self.build_url(bounds);
        let label = redact(&url);
        log::debug!("requesting relief raster from {label}");
        self.inner.block_on(&label, self.fetch_async(&url))
    }
}
