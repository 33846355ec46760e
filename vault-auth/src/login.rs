//! AWS login resolution.
//!
//! A login takes one of two paths. With [`AwsCredentialMaterial::Ec2Metadata`]
//! the [`InstanceMetadataAuth`] capability discovers and signs the identity
//! itself; with [`AwsCredentialMaterial::SignedRequest`] the caller's fields are
//! written to `auth/<mount>/login` as given. Either way the returned auth block
//! becomes a [`TokenRecord`] whose id is `nonce:<nonce>` when Vault reports a
//! nonce and `accessor:<accessor>` otherwise.
//!
//! Nothing is retried and no state is kept between calls.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aws::{
    IamMetadataAuth, InstanceMetadataAuth, PARAM_ACCESS_KEY_ID, PARAM_MOUNT, PARAM_ROLE,
    PARAM_SECRET_ACCESS_KEY, PARAM_SECURITY_TOKEN,
};
use crate::client::{Payload, ServiceClient};
use crate::common::{AwsCredentialMaterial, AwsLoginRequest, SignedRequest, TokenRecord, AWS_BACKEND};
use crate::error::LoginError;

/// Performs AWS logins against a Vault client.
#[derive(Clone)]
pub struct AwsLoginResolver {
    metadata_auth: Arc<dyn InstanceMetadataAuth>,
}

impl Default for AwsLoginResolver {
    fn default() -> Self {
        Self::new(Arc::new(IamMetadataAuth::new()))
    }
}

impl AwsLoginResolver {
    pub fn new(metadata_auth: Arc<dyn InstanceMetadataAuth>) -> Self {
        Self { metadata_auth }
    }

    #[instrument(
        skip(self, client, request),
        fields(login_id = %Uuid::new_v4(), mount = %request.normalized_mount_path())
    )]
    pub async fn login(
        &self,
        client: &dyn ServiceClient,
        request: &AwsLoginRequest,
    ) -> Result<TokenRecord, LoginError> {
        if request.auth_backend != AWS_BACKEND {
            return Err(LoginError::unsupported_backend(&request.auth_backend));
        }

        let mount = request.normalized_mount_path();
        let path = request.login_path();

        let secret = match &request.material {
            AwsCredentialMaterial::Ec2Metadata => {
                info!("Logging in to Vault at {} with EC2 instance metadata", path);
                let params = metadata_params(&mount, request.role.as_deref());
                self.metadata_auth
                    .authenticate(client, &params)
                    .await
                    .map_err(|source| LoginError::MetadataAuth { source })?
            }
            AwsCredentialMaterial::SignedRequest(signed) => {
                info!("Logging in to Vault at {} with signed identity", path);
                let payload = login_payload(request.role.as_deref(), signed);
                client
                    .write(&path, &payload)
                    .await
                    .map_err(|source| LoginError::LoginRequest { source })?
                    .ok_or_else(|| LoginError::EmptyResponse { path: path.clone() })?
            }
        };

        let received_at = Utc::now();
        let auth = secret
            .auth
            .ok_or_else(|| LoginError::MissingAuth { path: path.clone() })?;
        let record = TokenRecord::from_auth(secret.lease_id, auth, received_at);

        info!(
            "Logged in to Vault as {} (policies: {:?}, lease {}s, renewable: {})",
            record.id, record.policies, record.lease_duration, record.renewable
        );
        Ok(record)
    }
}

/// Logs in with the default instance-metadata capability.
pub async fn login(
    client: &dyn ServiceClient,
    request: &AwsLoginRequest,
) -> Result<TokenRecord, LoginError> {
    AwsLoginResolver::default().login(client, request).await
}

/// Payload for a signed-request login: only fields that are present, plus a non-empty role.
pub fn login_payload(role: Option<&str>, signed: &SignedRequest) -> Payload {
    let mut payload = Payload::new();

    if let Some(role) = role.filter(|role| !role.is_empty()) {
        payload.insert(PARAM_ROLE.to_string(), Value::String(role.to_string()));
    }
    for (name, value) in signed.fields() {
        if let Some(value) = value {
            payload.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    payload
}

/// Parameters for the instance-metadata capability; empty keys select the default credential chain.
pub fn metadata_params(mount: &str, role: Option<&str>) -> HashMap<String, String> {
    [
        (PARAM_MOUNT, mount),
        (PARAM_ROLE, role.unwrap_or_default()),
        (PARAM_ACCESS_KEY_ID, ""),
        (PARAM_SECRET_ACCESS_KEY, ""),
        (PARAM_SECURITY_TOKEN, ""),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, MetadataAuthError};
    use crate::testing::{secret, RecordingClient, StubMetadataAuth};
    use serde_json::json;

    fn signed(identity: &str, signature: &str) -> AwsCredentialMaterial {
        AwsCredentialMaterial::SignedRequest(SignedRequest {
            identity: Some(identity.to_string()),
            signature: Some(signature.to_string()),
            ..Default::default()
        })
    }

    fn resolver(stub: Arc<StubMetadataAuth>) -> AwsLoginResolver {
        AwsLoginResolver::new(stub)
    }

    #[tokio::test]
    async fn test_other_backends_rejected_without_network_call() {
        let client = RecordingClient::returning(Some(secret("acc", &[])));
        let stub = Arc::new(StubMetadataAuth::returning(secret("acc", &[])));

        for backend in ["gcp", "AWS", "", "approle"] {
            let request =
                AwsLoginRequest::new(AwsCredentialMaterial::Ec2Metadata).with_auth_backend(backend);
            match resolver(stub.clone()).login(&client, &request).await {
                Err(LoginError::UnsupportedBackend { backend: got }) => assert_eq!(got, backend),
                other => panic!("unexpected result {:?}", other),
            }
        }

        assert!(client.writes().is_empty());
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_signed_request_payload_has_only_present_fields() {
        let client = RecordingClient::returning(Some(secret("acc", &[])));
        let request = AwsLoginRequest::new(signed("ID", "SIG")).with_mount_path("/aws/");

        resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap();

        let writes = client.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "auth/aws/login");
        assert_eq!(
            Value::Object(writes[0].1.clone()),
            json!({"identity": "ID", "signature": "SIG"})
        );
    }

    #[tokio::test]
    async fn test_signed_request_payload_includes_role() {
        let client = RecordingClient::returning(Some(secret("acc", &[])));
        let request = AwsLoginRequest::new(signed("ID", "SIG")).with_role("web");

        resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap();

        assert_eq!(
            Value::Object(client.writes()[0].1.clone()),
            json!({"role": "web", "identity": "ID", "signature": "SIG"})
        );
    }

    #[test]
    fn test_login_payload_keeps_empty_strings() {
        let signed = SignedRequest {
            pkcs7: Some("MIAGCSqG".to_string()),
            nonce: Some(String::new()),
            iam_http_request_method: Some("POST".to_string()),
            ..Default::default()
        };
        let payload = login_payload(Some(""), &signed);

        assert_eq!(
            Value::Object(payload),
            json!({"pkcs7": "MIAGCSqG", "nonce": "", "iam_http_request_method": "POST"})
        );
    }

    #[tokio::test]
    async fn test_nonce_identity() {
        let client = RecordingClient::returning(Some(secret(
            "xyz",
            &[("nonce", "abc123"), ("instance_id", "i-0abc")],
        )));
        let request = AwsLoginRequest::new(signed("ID", "SIG"));

        let record = resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap();

        assert_eq!(record.id, "nonce:abc123");
        assert_eq!(record.nonce, "abc123");
        assert_eq!(record.metadata["instance_id"], "i-0abc");
    }

    #[tokio::test]
    async fn test_accessor_identity() {
        let client = RecordingClient::returning(Some(secret("xyz", &[])));
        let request = AwsLoginRequest::new(signed("ID", "SIG"));

        let record = resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap();

        assert_eq!(record.id, "accessor:xyz");
        assert_eq!(record.nonce, "");
    }

    #[tokio::test]
    async fn test_ec2_metadata_path_delegates() {
        let client = RecordingClient::returning(None);
        let stub = Arc::new(StubMetadataAuth::returning(secret("acc1", &[])));
        let request = AwsLoginRequest::new(AwsCredentialMaterial::Ec2Metadata)
            .with_mount_path("/aws-prod/")
            .with_role("web");

        let before = Utc::now();
        let record = resolver(stub.clone()).login(&client, &request).await.unwrap();
        let after = Utc::now();

        assert_eq!(record.id, "accessor:acc1");
        assert!(record.lease_start_time >= before && record.lease_start_time <= after);
        assert!(client.writes().is_empty());

        let calls = stub.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][PARAM_MOUNT], "aws-prod");
        assert_eq!(calls[0][PARAM_ROLE], "web");
        assert_eq!(calls[0][PARAM_ACCESS_KEY_ID], "");
    }

    #[tokio::test]
    async fn test_metadata_failure_wrapped() {
        let client = RecordingClient::returning(None);
        let request = AwsLoginRequest::new(AwsCredentialMaterial::Ec2Metadata);

        let err = resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap_err();

        match err {
            LoginError::MetadataAuth {
                source: MetadataAuthError::Credentials { message },
            } => assert!(message.contains("instance role")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_failure_wrapped() {
        let client = RecordingClient::failing(400);
        let request = AwsLoginRequest::new(signed("ID", "SIG"));

        let err = resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoginError::LoginRequest {
                source: ClientError::Response { status: 400, .. }
            }
        ));
        assert!(err.to_string().starts_with("error reading from Vault"));
    }

    #[tokio::test]
    async fn test_empty_and_authless_responses() {
        let request = AwsLoginRequest::new(signed("ID", "SIG"));
        let resolver = resolver(Arc::new(StubMetadataAuth::failing()));

        let empty = RecordingClient::returning(None);
        assert!(matches!(
            resolver.login(&empty, &request).await,
            Err(LoginError::EmptyResponse { .. })
        ));

        let mut authless = secret("acc", &[]);
        authless.auth = None;
        let authless = RecordingClient::returning(Some(authless));
        assert!(matches!(
            resolver.login(&authless, &request).await,
            Err(LoginError::MissingAuth { .. })
        ));
    }

    #[tokio::test]
    async fn test_error_messages_never_carry_token() {
        let client = RecordingClient::failing(500);
        let request = AwsLoginRequest::new(signed("ID", "SIG"));
        let err = resolver(Arc::new(StubMetadataAuth::failing()))
            .login(&client, &request)
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("s.token-for"));
    }
}
