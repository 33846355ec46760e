use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::client::ServiceClient;
use crate::common::{Secret, DEFAULT_AWS_MOUNT};
use crate::error::MetadataAuthError;

pub mod sigv4;

pub const PARAM_MOUNT: &str = "mount";
pub const PARAM_ROLE: &str = "role";
pub const PARAM_ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const PARAM_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const PARAM_SECURITY_TOKEN: &str = "aws_security_token";
pub const PARAM_REGION: &str = "region";
pub const PARAM_HEADER_VALUE: &str = "header_value";

pub const DEFAULT_REGION: &str = "us-east-1";

/// Logs in to Vault using identity discovered on the local machine.
#[async_trait]
pub trait InstanceMetadataAuth: Send + Sync {
    async fn authenticate(
        &self,
        client: &dyn ServiceClient,
        params: &HashMap<String, String>,
    ) -> Result<Secret, MetadataAuthError>;
}

/// IAM login with credentials from the AWS default chain (environment, profile,
/// or the EC2 instance role), unless static keys are passed in `params`.
#[derive(Debug, Clone, Default)]
pub struct IamMetadataAuth;

impl IamMetadataAuth {
    pub fn new() -> Self {
        Self
    }

    async fn credentials(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Credentials, MetadataAuthError> {
        let access_key = param(params, PARAM_ACCESS_KEY_ID);
        let secret_key = param(params, PARAM_SECRET_ACCESS_KEY);

        if let (Some(access_key), Some(secret_key)) = (access_key, secret_key) {
            debug!("Using static AWS credentials");
            return Ok(Credentials::new(
                access_key,
                secret_key,
                param(params, PARAM_SECURITY_TOKEN).map(str::to_string),
                None,
                "vault-auth-static",
            ));
        }

        let cfg = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let provider = cfg
            .credentials_provider()
            .ok_or_else(|| MetadataAuthError::credentials("no AWS credentials provider available"))?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| MetadataAuthError::credentials(e.to_string()))
    }
}

#[async_trait]
impl InstanceMetadataAuth for IamMetadataAuth {
    #[instrument(skip(self, client, params))]
    async fn authenticate(
        &self,
        client: &dyn ServiceClient,
        params: &HashMap<String, String>,
    ) -> Result<Secret, MetadataAuthError> {
        let mount = param(params, PARAM_MOUNT).unwrap_or(DEFAULT_AWS_MOUNT);
        let region = param(params, PARAM_REGION).unwrap_or(DEFAULT_REGION);
        let role = params.get(PARAM_ROLE).cloned().unwrap_or_default();

        let credentials = self.credentials(params).await?;
        let login = sigv4::sign_get_caller_identity(
            &credentials,
            region,
            param(params, PARAM_HEADER_VALUE),
            Utc::now(),
        )?;

        let mut payload = login.into_login_payload()?;
        payload.insert(PARAM_ROLE.to_string(), Value::String(role));

        let path = format!("auth/{}/login", mount.trim_matches('/'));
        info!("Submitting signed GetCallerIdentity request to {}", path);

        client
            .write(&path, &payload)
            .await?
            .ok_or(MetadataAuthError::EmptyResponse)
    }
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}
