use async_trait::async_trait;
use hyper::client::connect::Connect;
use hyper::header::HeaderMap;
use hyper::{Body, Client, Request, Response};
use std::time::Instant;
use tracing::debug;

const REDACTED_HEADERS: &[&str] = &["x-vault-token", "authorization"];

/// Sends one HTTP request and returns the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, hyper::Error>;
}

#[async_trait]
impl<C> Transport for Client<C, Body>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        self.request(request).await
    }
}

/// Traces requests and responses of the wrapped transport without touching their bodies.
pub struct LoggingTransport<T> {
    name: String,
    inner: T,
}

impl<T> LoggingTransport<T> {
    pub fn new(name: impl Into<String>, inner: T) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, hyper::Error> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        debug!(
            "{} API Request: {} {} headers={}",
            self.name,
            method,
            uri,
            render_headers(request.headers())
        );

        let started = Instant::now();
        match self.inner.send(request).await {
            Ok(response) => {
                debug!(
                    "{} API Response: {} {} -> {} in {:?}",
                    self.name,
                    method,
                    uri,
                    response.status(),
                    started.elapsed()
                );
                Ok(response)
            }
            Err(e) => {
                debug!("{} API Error: {} {}: {}", self.name, method, uri, e);
                Err(e)
            }
        }
    }
}

/// Header list for traces, with credentials replaced by `<redacted>`.
pub(crate) fn render_headers(headers: &HeaderMap) -> String {
    let rendered: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            if REDACTED_HEADERS.contains(&name.as_str()) {
                format!("{}: <redacted>", name)
            } else {
                format!("{}: {}", name, value.to_str().unwrap_or("<binary>"))
            }
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}
