use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A single problem found while validating declared configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{block}' block can appear only once")]
    DuplicateBlock { block: String },

    #[error("'{block}' block must be provided {reason}")]
    MissingBlock { block: String, reason: String },

    #[error("'{field}' is required")]
    MissingField { field: String },

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("'{field}' conflicts with {}", .conflicts.join(", "))]
    ConflictingFields {
        field: String,
        conflicts: Vec<String>,
    },
}

impl ConfigError {
    pub fn duplicate_block(block: impl Into<String>) -> Self {
        Self::DuplicateBlock {
            block: block.into(),
        }
    }

    pub fn missing_block(block: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingBlock {
            block: block.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every configuration problem found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn push(&mut self, error: ConfigError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was recorded, otherwise the collected errors.
    pub fn into_result<T>(self, value: T) -> Result<T, ConfigErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(error: ConfigError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ConfigErrors {}

/// Errors building the Vault client handle.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigErrors),

    #[error("failed to configure TLS for Vault API: {message}")]
    TlsConfig { message: String },

    #[error("failed to configure Vault API: invalid address {address:?}: {message}")]
    ClientInit { address: String, message: String },
}

impl ConnectionError {
    pub fn tls_config(message: impl Into<String>) -> Self {
        Self::TlsConfig {
            message: message.into(),
        }
    }

    pub fn client_init(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClientInit {
            address: address.into(),
            message: message.into(),
        }
    }
}

/// Errors from a single round-trip to the Vault HTTP API.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid request path {path:?}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("HTTP client error: {source}")]
    Http {
        #[from]
        source: hyper::Error,
    },

    #[error("failed to build request: {source}")]
    Request {
        #[from]
        source: hyper::http::Error,
    },

    #[error("Serialization/deserialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Error making API request.\n\nURL: {method} {url}\nCode: {status}. Errors:\n\n{}", format_errors(.errors))]
    Response {
        method: String,
        url: String,
        status: u16,
        errors: Vec<String>,
    },
}

fn format_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("* {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from the instance-metadata identity capability.
#[derive(Error, Debug)]
pub enum MetadataAuthError {
    #[error("failed to retrieve AWS credentials: {message}")]
    Credentials { message: String },

    #[error("failed to sign STS request: {message}")]
    Signing { message: String },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("empty response from credential provider")]
    EmptyResponse,
}

impl MetadataAuthError {
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }
}

/// Errors from one AWS login attempt.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigErrors),

    #[error("unsupported auth_backend {backend:?}")]
    UnsupportedBackend { backend: String },

    #[error("error authenticating with EC2 metadata: {source}")]
    MetadataAuth {
        #[source]
        source: MetadataAuthError,
    },

    #[error("error reading from Vault: {source}")]
    LoginRequest {
        #[source]
        source: ClientError,
    },

    #[error("empty response from Vault for {path}")]
    EmptyResponse { path: String },

    #[error("response from Vault for {path} carries no auth block")]
    MissingAuth { path: String },
}

impl LoginError {
    pub fn unsupported_backend(backend: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_display_joins_messages() {
        let mut errors = ConfigErrors::default();
        errors.push(ConfigError::duplicate_block("vault"));
        errors.push(ConfigError::missing_field("vault.address"));

        assert_eq!(
            errors.to_string(),
            "'vault' block can appear only once; 'vault.address' is required"
        );
    }

    #[test]
    fn test_conflicting_fields_display() {
        let err = ConfigError::ConflictingFields {
            field: "aws.use_ec2_metadata".to_string(),
            conflicts: vec!["aws.identity".to_string(), "aws.signature".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'aws.use_ec2_metadata' conflicts with aws.identity, aws.signature"
        );
    }

    #[test]
    fn test_unsupported_backend_carries_value() {
        let err = LoginError::unsupported_backend("gcp");
        assert_eq!(err.to_string(), "unsupported auth_backend \"gcp\"");
    }

    #[test]
    fn test_response_error_lists_server_errors() {
        let err = ClientError::Response {
            method: "PUT".to_string(),
            url: "https://vault:8200/v1/auth/aws/login".to_string(),
            status: 400,
            errors: vec!["entry for role dev not found".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("Code: 400"));
        assert!(message.contains("* entry for role dev not found"));
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ConfigErrors::default().into_result(7), Ok(7));
        let errors = ConfigErrors::from(ConfigError::missing_field("x"));
        assert!(errors.into_result(7).is_err());
    }
}
