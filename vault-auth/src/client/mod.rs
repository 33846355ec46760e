use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request, Uri};
use hyper_tls::HttpsConnector;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::common::{ConnectionSettings, Secret, DEFAULT_CLIENT_TIMEOUT};
use crate::error::{ClientError, ConnectionError};

pub mod tls;
pub mod transport;

pub use transport::{LoggingTransport, Transport};

/// Login payload: JSON object written to a Vault path.
pub type Payload = Map<String, Value>;

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Authenticated access to the Vault HTTP API.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Writes `payload` to `path` (relative to `/v1/`). `Ok(None)` means an empty response.
    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Secret>, ClientError>;
}

/// Vault API client bound to a single address.
#[derive(Clone)]
pub struct VaultClient {
    address: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultClient {
    pub fn new(address: &str, transport: Arc<dyn Transport>) -> Result<Self, ConnectionError> {
        let uri: Uri = address
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| ConnectionError::client_init(address, e.to_string()))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            Some(other) => {
                return Err(ConnectionError::client_init(
                    address,
                    format!("unsupported scheme {:?}", other),
                ))
            }
            None => return Err(ConnectionError::client_init(address, "missing scheme")),
        }
        if uri.authority().is_none() {
            return Err(ConnectionError::client_init(address, "missing host"));
        }

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            transport,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        })
    }

    /// Bounds each request, including reading the response body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url_for(&self, path: &str) -> Result<String, ClientError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ClientError::InvalidPath {
                path: path.to_string(),
                message: "path is empty".to_string(),
            });
        }

        let encoded = trimmed
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("/");
        Ok(format!("{}/v1/{}", self.address, encoded))
    }
}

#[async_trait]
impl ServiceClient for VaultClient {
    #[instrument(skip(self, payload))]
    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Secret>, ClientError> {
        let url = self.url_for(path)?;
        let body = serde_json::to_vec(payload)?;

        let request = Request::builder()
            .method(Method::PUT)
            .uri(url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))?;

        let exchange = async {
            let response = self.transport.send(request).await?;
            let status = response.status();
            let bytes = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>((status, bytes))
        };
        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout {
                url: url.clone(),
                timeout: self.timeout,
            })??;

        if !status.is_success() {
            let errors = match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(parsed) if !parsed.errors.is_empty() => parsed.errors,
                _ if bytes.is_empty() => Vec::new(),
                _ => vec![String::from_utf8_lossy(&bytes).trim().to_string()],
            };
            return Err(ClientError::Response {
                method: Method::PUT.to_string(),
                url,
                status: status.as_u16(),
                errors,
            });
        }

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            debug!("Empty response from {}", url);
            return Ok(None);
        }

        let secret: Secret = serde_json::from_slice(&bytes)?;
        for warning in &secret.warnings {
            warn!("Vault warning for {}: {}", path, warning);
        }
        Ok(Some(secret))
    }
}

/// Builds the Vault client: TLS from `settings`, wrapped in the logging transport.
pub fn configure(settings: &ConnectionSettings) -> Result<VaultClient, ConnectionError> {
    let tls = tls::tls_connector(settings)?;

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));
    let http_client = Client::builder().build::<_, Body>(https);

    let transport = LoggingTransport::new("Vault", http_client);
    Ok(VaultClient::new(&settings.address, Arc::new(transport))?.with_timeout(settings.timeout))
}
