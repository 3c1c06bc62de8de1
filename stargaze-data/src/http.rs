//! Blocking bridge over the async HTTP client shared by every remote source.
//!
//! Importers run on plain worker threads, so each client owns a Tokio runtime
//! and blocks on it. When a caller is already inside a multi-threaded runtime
//! the ambient handle is used with [`tokio::task::block_in_place`] instead,
//! which avoids nested-runtime panics.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

/// Default user agent for outbound requests.
pub const DEFAULT_USER_AGENT: &str = "stargaze/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Errors raised while talking to a remote data source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with HTTP {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
    },
    /// The connection failed before a response arrived.
    #[error("network error talking to {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Error description.
        message: String,
    },
    /// The request exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Error description.
        message: String,
    },
    /// The response body was empty where content is required.
    #[error("response from {url} was empty")]
    EmptyPayload {
        /// Requested URL.
        url: String,
    },
    /// The response body exceeded the configured size limit.
    #[error("response from {url} exceeded {limit} bytes")]
    PayloadTooLarge {
        /// Requested URL.
        url: String,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The caller cancelled the request before it completed.
    #[error("request to {url} was cancelled")]
    Cancelled {
        /// Requested URL.
        url: String,
    },
}

/// Errors raised while constructing an HTTP-backed source.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime")]
    Runtime(#[source] std::io::Error),
    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint URL `{endpoint}`")]
    Endpoint {
        /// Rejected endpoint.
        endpoint: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
}

/// Connection settings shared by the HTTP sources.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Endpoint URL.
    pub endpoint: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Token that aborts in-flight requests when cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl HttpSourceConfig {
    /// Create a configuration for `endpoint` with default settings.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            cancellation: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Abort requests once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// An async `reqwest` client driven synchronously.
pub(crate) struct BlockingClient {
    client: Client,
    runtime: Runtime,
    endpoint: url::Url,
    timeout: Duration,
    cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl BlockingClient {
    pub(crate) fn new(config: &HttpSourceConfig) -> Result<Self, ClientBuildError> {
        let endpoint =
            url::Url::parse(&config.endpoint).map_err(|source| ClientBuildError::Endpoint {
                endpoint: config.endpoint.clone(),
                source,
            })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ClientBuildError::HttpClient)?;
        // Several importer threads may block on this runtime at once; a
        // multi-threaded runtime keeps their I/O progressing independently.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stargaze-http")
            .enable_all()
            .build()
            .map_err(ClientBuildError::Runtime)?;
        Ok(Self {
            client,
            runtime,
            endpoint,
            timeout: config.timeout,
            cancellation: config.cancellation.clone(),
        })
    }

    pub(crate) const fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) const fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Drive `future` to completion, aborting early on cancellation.
    pub(crate) fn block_on<T, F>(&self, url: &str, future: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let cancelled = || SourceError::Cancelled {
            url: url.to_owned(),
        };
        let guarded = async {
            match &self.cancellation {
                Some(token) if token.is_cancelled() => Err(cancelled()),
                Some(token) => tokio::select! {
                    () = token.cancelled() => Err(cancelled()),
                    outcome = future => outcome,
                },
                None => future.await,
            }
        };
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(guarded))
            }
            _ => self.runtime.block_on(guarded),
        }
    }

    /// Convert a reqwest error into a [`SourceError`].
    pub(crate) fn convert_error(&self, error: &reqwest::Error, url: &str) -> SourceError {
        if error.is_timeout() {
            return SourceError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return SourceError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        if error.is_decode() {
            return SourceError::Decode {
                url: url.to_owned(),
                message: error.to_string(),
            };
        }

        SourceError::Network {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod loopback {
    //! One-shot HTTP server for exercising clients without the network.

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned response on a loopback port.
    ///
    /// Returns the base URL and a handle yielding the raw request text.
    pub(crate) fn serve_once(
        status: &'static str,
        body: impl Into<Vec<u8>>,
    ) -> (String, thread::JoinHandle<String>) {
        let body = body.into();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let address = listener.local_addr().expect("local address");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept connection");
            let request = read_request(&mut stream);
            let head = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).expect("write head");
            stream.write_all(&body).expect("write body");
            request
        });
        (format!("http://{address}"), handle)
    }

    fn read_request(stream: &mut impl Read) -> String {
        let mut request = Vec::new();
        let mut buffer = [0_u8; 4096];
        loop {
            let read = stream.read(&mut buffer).expect("read request");
            request.extend_from_slice(&buffer[..read]);
            let text = String::from_utf8_lossy(&request);
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|value| value.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if request.len() >= split + 4 + length {
                    break;
                }
            }
            if read == 0 {
                break;
            }
        }
        String::from_utf8_lossy(&request).into_owned()
    }
}
