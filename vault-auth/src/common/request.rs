use serde::{Deserialize, Serialize};

/// The only auth backend kind handled by the login resolver.
pub const AWS_BACKEND: &str = "aws";

/// Mount path used when a request leaves it empty.
pub const DEFAULT_AWS_MOUNT: &str = "aws";

/// One login attempt against the AWS auth backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsLoginRequest {
    pub auth_backend: String,
    pub mount_path: String,
    pub role: Option<String>,
    pub material: AwsCredentialMaterial,
}

impl AwsLoginRequest {
    pub fn new(material: AwsCredentialMaterial) -> Self {
        Self {
            auth_backend: AWS_BACKEND.to_string(),
            mount_path: String::new(),
            role: None,
            material,
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_auth_backend(mut self, auth_backend: impl Into<String>) -> Self {
        self.auth_backend = auth_backend.into();
        self
    }

    /// Mount path with leading and trailing `/` removed, or the default mount.
    pub fn normalized_mount_path(&self) -> String {
        let trimmed = self.mount_path.trim_matches('/');
        if trimmed.is_empty() {
            DEFAULT_AWS_MOUNT.to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn login_path(&self) -> String {
        format!("auth/{}/login", self.normalized_mount_path())
    }
}

/// Identity material for an AWS login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCredentialMaterial {
    /// Derive identity from the local instance metadata and credential chain.
    Ec2Metadata,
    /// Caller-supplied EC2 identity document or pre-signed STS request.
    SignedRequest(SignedRequest),
}

/// Caller-supplied login fields. `None` fields are never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkcs7: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_http_request_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_request_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_request_body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_request_headers: Option<String>,
}

impl SignedRequest {
    /// Field names paired with their values, in login payload order.
    pub fn fields(&self) -> [(&'static str, Option<&str>); 8] {
        [
            ("identity", self.identity.as_deref()),
            ("signature", self.signature.as_deref()),
            ("pkcs7", self.pkcs7.as_deref()),
            ("nonce", self.nonce.as_deref()),
            ("iam_http_request_method", self.iam_http_request_method.as_deref()),
            ("iam_request_url", self.iam_request_url.as_deref()),
            ("iam_request_body", self.iam_request_body.as_deref()),
            ("iam_request_headers", self.iam_request_headers.as_deref()),
        ]
    }
}
