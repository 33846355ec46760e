use clap::Parser;
use std::path::PathBuf;

use vault_auth::common::{
    AuthTokenQuery, AwsSettings, ClientAuthBlock, ConnectionBlock, ProviderConfig, SignedRequest,
    ENV_VAULT_ADDR, ENV_VAULT_CACERT, ENV_VAULT_CAPATH, ENV_VAULT_CLIENT_CERT,
    ENV_VAULT_CLIENT_KEY,
};

#[derive(Parser, Debug, Clone)]
pub struct ConnectionArgs {
    /// URL of the root of the target Vault server
    #[arg(long, env = ENV_VAULT_ADDR)]
    pub address: Option<String>,

    /// Path to a CA certificate file to validate the server's certificate
    #[arg(long, env = ENV_VAULT_CACERT)]
    pub ca_cert_file: Option<String>,

    /// Path to a directory containing CA certificate files
    #[arg(long, env = ENV_VAULT_CAPATH)]
    pub ca_cert_dir: Option<String>,

    /// Path to a file containing the client certificate
    #[arg(long, env = ENV_VAULT_CLIENT_CERT)]
    pub client_cert: Option<String>,

    /// Path to a file containing the private key the client certificate was issued for
    #[arg(long, env = ENV_VAULT_CLIENT_KEY)]
    pub client_key: Option<String>,

    /// Skip TLS verification (insecure development instances only; also VAULT_SKIP_VERIFY)
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// Seconds to wait for each Vault request (also VAULT_CLIENT_TIMEOUT, default 60)
    #[arg(long)]
    pub client_timeout: Option<u64>,
}

impl ConnectionArgs {
    pub fn provider_config(&self) -> ProviderConfig {
        let client_auth = if self.client_cert.is_some() || self.client_key.is_some() {
            vec![ClientAuthBlock {
                cert_file: self.client_cert.clone(),
                key_file: self.client_key.clone(),
            }]
        } else {
            Vec::new()
        };

        ProviderConfig {
            vault: vec![ConnectionBlock {
                address: self.address.clone(),
                ca_cert_file: self.ca_cert_file.clone(),
                ca_cert_dir: self.ca_cert_dir.clone(),
                client_auth,
                // Unset falls through to VAULT_SKIP_VERIFY.
                skip_tls_verify: self.skip_tls_verify.then_some(true),
                client_timeout: self.client_timeout,
            }],
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct LoginCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Name of the Vault auth backend
    #[arg(long, default_value = "aws")]
    pub auth_backend: String,

    /// Role against which the token will be created
    #[arg(long)]
    pub role: Option<String>,

    /// Mount path of the auth backend
    #[arg(long)]
    pub mount_path: Option<String>,

    /// Use EC2 instance metadata to authenticate with Vault
    #[arg(long)]
    pub use_ec2_metadata: bool,

    /// Base64-encoded EC2 instance identity document
    #[arg(long)]
    pub identity: Option<String>,

    /// Base64-encoded SHA256 RSA signature of the instance identity document
    #[arg(long)]
    pub signature: Option<String>,

    /// PKCS7 signature of the identity document
    #[arg(long)]
    pub pkcs7: Option<String>,

    /// Nonce returned by a previous login
    #[arg(long)]
    pub nonce: Option<String>,

    /// HTTP method used in the signed request
    #[arg(long)]
    pub iam_http_request_method: Option<String>,

    /// Base64-encoded HTTP URL used in the signed request
    #[arg(long)]
    pub iam_request_url: Option<String>,

    /// Base64-encoded body of the signed request
    #[arg(long)]
    pub iam_request_body: Option<String>,

    /// Base64-encoded, JSON serialized sts:GetCallerIdentity request headers
    #[arg(long)]
    pub iam_request_headers: Option<String>,
}

impl LoginCommand {
    pub fn query(&self) -> AuthTokenQuery {
        AuthTokenQuery {
            auth_backend: self.auth_backend.clone(),
            role: self.role.clone(),
            mount_path: self.mount_path.clone(),
            aws: vec![AwsSettings {
                use_ec2_metadata: self.use_ec2_metadata,
                signed: SignedRequest {
                    identity: self.identity.clone(),
                    signature: self.signature.clone(),
                    pkcs7: self.pkcs7.clone(),
                    nonce: self.nonce.clone(),
                    iam_http_request_method: self.iam_http_request_method.clone(),
                    iam_request_url: self.iam_request_url.clone(),
                    iam_request_body: self.iam_request_body.clone(),
                    iam_request_headers: self.iam_request_headers.clone(),
                },
            }],
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ReadCommand {
    /// YAML document with `vault` blocks and a `data` query
    #[arg(short, long)]
    pub file: PathBuf,
}
