//! Test doubles for the Vault API and the instance-metadata capability.

use async_trait::async_trait;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::aws::InstanceMetadataAuth;
use crate::client::{Payload, ServiceClient};
use crate::common::{Secret, SecretAuth};
use crate::error::{ClientError, MetadataAuthError};

/// A request received by [`spawn_vault`].
#[derive(Debug)]
pub struct Captured {
    pub method: Method,
    pub path: String,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Serves every request with `status` and `body` on an ephemeral local port.
pub async fn spawn_vault(
    status: StatusCode,
    body: &'static str,
) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let make_svc = make_service_fn(move |_conn| {
        let tx = tx.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let tx = tx.clone();
                async move {
                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let bytes = hyper::body::to_bytes(req.into_body()).await?;
                    let _ = tx.send(Captured {
                        method,
                        path,
                        body: bytes.to_vec(),
                    });
                    Ok::<_, hyper::Error>(
                        Response::builder()
                            .status(status)
                            .header("content-type", "application/json")
                            .body(Body::from(body))
                            .unwrap(),
                    )
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let address = format!("http://{}", server.local_addr());
    tokio::spawn(server);

    (address, rx)
}

pub fn secret(accessor: &str, metadata: &[(&str, &str)]) -> Secret {
    Secret {
        lease_id: String::new(),
        auth: Some(SecretAuth {
            client_token: format!("s.token-for-{}", accessor),
            accessor: accessor.to_string(),
            policies: vec!["default".to_string()],
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            lease_duration: 3600,
            renewable: true,
        }),
        ..Default::default()
    }
}

/// Records writes and answers each with a fixed outcome.
pub struct RecordingClient {
    pub writes: Mutex<Vec<(String, Payload)>>,
    response: Option<Secret>,
    fail_status: Option<u16>,
}

impl RecordingClient {
    pub fn returning(secret: Option<Secret>) -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            response: secret,
            fail_status: None,
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            response: None,
            fail_status: Some(status),
        }
    }

    pub fn writes(&self) -> Vec<(String, Payload)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceClient for RecordingClient {
    async fn write(&self, path: &str, payload: &Payload) -> Result<Option<Secret>, ClientError> {
        self.writes
            .lock()
            .unwrap()
            .push((path.to_string(), payload.clone()));

        match self.fail_status {
            Some(status) => Err(ClientError::Response {
                method: "PUT".to_string(),
                url: format!("http://stub/v1/{}", path),
                status,
                errors: vec!["permission denied".to_string()],
            }),
            None => Ok(self.response.clone()),
        }
    }
}

/// Metadata capability that returns a fixed secret and records its parameters.
pub struct StubMetadataAuth {
    pub calls: Mutex<Vec<HashMap<String, String>>>,
    response: Option<Secret>,
}

impl StubMetadataAuth {
    pub fn returning(secret: Secret) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Some(secret),
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: None,
        }
    }

    pub fn calls(&self) -> Vec<HashMap<String, String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstanceMetadataAuth for StubMetadataAuth {
    async fn authenticate(
        &self,
        _client: &dyn ServiceClient,
        params: &HashMap<String, String>,
    ) -> Result<Secret, MetadataAuthError> {
        self.calls.lock().unwrap().push(params.clone());
        self.response
            .clone()
            .ok_or_else(|| MetadataAuthError::credentials("no EC2 instance role available"))
    }
}
