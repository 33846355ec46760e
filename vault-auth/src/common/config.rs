use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::request::{AwsCredentialMaterial, AwsLoginRequest, SignedRequest, AWS_BACKEND};
use crate::error::{ConfigError, ConfigErrors, LoginError};

pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_CACERT: &str = "VAULT_CACERT";
pub const ENV_VAULT_CAPATH: &str = "VAULT_CAPATH";
pub const ENV_VAULT_CLIENT_CERT: &str = "VAULT_CLIENT_CERT";
pub const ENV_VAULT_CLIENT_KEY: &str = "VAULT_CLIENT_KEY";
pub const ENV_VAULT_SKIP_VERIFY: &str = "VAULT_SKIP_VERIFY";
pub const ENV_VAULT_CLIENT_TIMEOUT: &str = "VAULT_CLIENT_TIMEOUT";

/// Per-request timeout used when none is configured.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Declared provider configuration. Blocks are lists so repeated blocks can be reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub vault: Vec<ConnectionBlock>,
}

/// A `vault` connection block; absent fields fall back to the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionBlock {
    /// URL of the root of the target Vault server
    #[serde(default)]
    pub address: Option<String>,

    /// Path to a CA certificate file to validate the server's certificate
    #[serde(default)]
    pub ca_cert_file: Option<String>,

    /// Path to a directory of CA certificate files
    #[serde(default)]
    pub ca_cert_dir: Option<String>,

    /// Client certificate authentication
    #[serde(default)]
    pub client_auth: Vec<ClientAuthBlock>,

    /// Only for insecure development instances
    #[serde(default)]
    pub skip_tls_verify: Option<bool>,

    /// Seconds to wait for each Vault request
    #[serde(default)]
    pub client_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthBlock {
    #[serde(default)]
    pub cert_file: Option<String>,

    #[serde(default)]
    pub key_file: Option<String>,
}

/// Resolved connection settings for the Vault client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub address: String,
    pub ca_cert_file: Option<PathBuf>,
    pub ca_cert_dir: Option<PathBuf>,
    pub client_certificate: Option<ClientCertificate>,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ca_cert_file: None,
            ca_cert_dir: None,
            client_certificate: None,
            skip_tls_verify: false,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

/// Client certificate and key, always supplied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl ProviderConfig {
    /// Resolves connection settings using the process environment for defaults.
    pub fn resolve(&self) -> Result<ConnectionSettings, ConfigErrors> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, env: F) -> Result<ConnectionSettings, ConfigErrors>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.vault.len() > 1 {
            return Err(ConfigError::duplicate_block("vault").into());
        }

        // No block at all behaves like an empty one: everything from the environment.
        let block = self.vault.first().cloned().unwrap_or_default();
        block.resolve_with(env)
    }
}

impl ConnectionBlock {
    pub fn resolve_with<F>(&self, env: F) -> Result<ConnectionSettings, ConfigErrors>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = ConfigErrors::default();

        let address = or_env(&self.address, ENV_VAULT_ADDR, &env);
        if address.is_none() {
            errors.push(ConfigError::missing_field("vault.address"));
        }

        let skip_tls_verify = match self.skip_tls_verify {
            Some(value) => value,
            None => match env(ENV_VAULT_SKIP_VERIFY) {
                Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                    errors.push(ConfigError::invalid_value(
                        "vault.skip_tls_verify",
                        format!("{} must be a boolean, got {:?}", ENV_VAULT_SKIP_VERIFY, raw),
                    ));
                    false
                }),
                None => false,
            },
        };

        let timeout = match self.client_timeout {
            Some(0) => {
                errors.push(ConfigError::invalid_value(
                    "vault.client_timeout",
                    "must be at least one second",
                ));
                DEFAULT_CLIENT_TIMEOUT
            }
            Some(seconds) => Duration::from_secs(seconds),
            None => match env(ENV_VAULT_CLIENT_TIMEOUT).filter(|raw| !raw.is_empty()) {
                Some(raw) => parse_timeout(&raw).unwrap_or_else(|| {
                    errors.push(ConfigError::invalid_value(
                        "vault.client_timeout",
                        format!(
                            "{} must be a positive number of seconds, got {:?}",
                            ENV_VAULT_CLIENT_TIMEOUT, raw
                        ),
                    ));
                    DEFAULT_CLIENT_TIMEOUT
                }),
                None => DEFAULT_CLIENT_TIMEOUT,
            },
        };

        let client_certificate = match self.client_auth.as_slice() {
            [] => None,
            [client_auth] => {
                let cert_file = or_env(&client_auth.cert_file, ENV_VAULT_CLIENT_CERT, &env);
                let key_file = or_env(&client_auth.key_file, ENV_VAULT_CLIENT_KEY, &env);
                if cert_file.is_none() {
                    errors.push(ConfigError::missing_field("vault.client_auth.cert_file"));
                }
                if key_file.is_none() {
                    errors.push(ConfigError::missing_field("vault.client_auth.key_file"));
                }
                match (cert_file, key_file) {
                    (Some(cert_file), Some(key_file)) => Some(ClientCertificate {
                        cert_file: PathBuf::from(cert_file),
                        key_file: PathBuf::from(key_file),
                    }),
                    _ => None,
                }
            }
            _ => {
                errors.push(ConfigError::duplicate_block("client_auth"));
                None
            }
        };

        errors.into_result(())?;

        Ok(ConnectionSettings {
            address: address.unwrap_or_default(),
            ca_cert_file: or_env(&self.ca_cert_file, ENV_VAULT_CACERT, &env).map(PathBuf::from),
            ca_cert_dir: or_env(&self.ca_cert_dir, ENV_VAULT_CAPATH, &env).map(PathBuf::from),
            client_certificate,
            skip_tls_verify,
            timeout,
        })
    }
}

/// Declared value if non-empty, otherwise the non-empty environment value.
fn or_env<F>(value: &Option<String>, key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    value
        .clone()
        .filter(|v| !v.is_empty())
        .or_else(|| env(key).filter(|v| !v.is_empty()))
}

/// Accepts the same spellings as Vault's own environment parsing; empty is false.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        _ => None,
    }
}

/// Seconds, with or without an `s` suffix (`30`, `30s`).
fn parse_timeout(raw: &str) -> Option<Duration> {
    let seconds: u64 = raw.strip_suffix('s').unwrap_or(raw).parse().ok()?;
    (seconds > 0).then_some(Duration::from_secs(seconds))
}

/// Input of the auth token read operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthTokenQuery {
    /// Name of the Vault auth backend
    pub auth_backend: String,

    /// Role against which the token will be created
    #[serde(default)]
    pub role: Option<String>,

    /// Mount path of the auth backend
    #[serde(default)]
    pub mount_path: Option<String>,

    #[serde(default)]
    pub aws: Vec<AwsSettings>,
}

/// The `aws` settings block of a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsSettings {
    /// Use EC2 instance metadata to authenticate with Vault
    #[serde(default)]
    pub use_ec2_metadata: bool,

    #[serde(flatten)]
    pub signed: SignedRequest,
}

impl AuthTokenQuery {
    /// Validates the query into a login request.
    pub fn to_request(&self) -> Result<AwsLoginRequest, LoginError> {
        if self.auth_backend != AWS_BACKEND {
            return Err(LoginError::unsupported_backend(&self.auth_backend));
        }

        let settings = match self.aws.as_slice() {
            [settings] => settings,
            [] => {
                return Err(LoginError::Configuration(
                    ConfigError::missing_block("aws", "with auth_backend 'aws'").into(),
                ))
            }
            _ => {
                return Err(LoginError::Configuration(
                    ConfigError::duplicate_block("aws").into(),
                ))
            }
        };

        let mut request = AwsLoginRequest::new(settings.material()?);
        if let Some(mount_path) = &self.mount_path {
            request = request.with_mount_path(mount_path);
        }
        if let Some(role) = &self.role {
            request = request.with_role(role);
        }
        Ok(request)
    }
}

impl AwsSettings {
    pub fn material(&self) -> Result<AwsCredentialMaterial, ConfigErrors> {
        if !self.use_ec2_metadata {
            let mut signed = self.signed.clone();
            signed.pkcs7 = signed.pkcs7.map(|pkcs7| pkcs7.replace('\n', ""));
            return Ok(AwsCredentialMaterial::SignedRequest(signed));
        }

        let conflicts: Vec<String> = self
            .signed
            .fields()
            .iter()
            .filter(|(name, value)| value.is_some() && *name != "nonce")
            .map(|(name, _)| format!("aws.{}", name))
            .collect();

        if conflicts.is_empty() {
            Ok(AwsCredentialMaterial::Ec2Metadata)
        } else {
            Err(ConfigError::ConflictingFields {
                field: "aws.use_ec2_metadata".to_string(),
                conflicts,
            }
            .into())
        }
    }
}
