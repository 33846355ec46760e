//! Exchange AWS identity material for a Vault token.
//!
//! [`client::configure`] builds a TLS-configured Vault client once per process;
//! [`AwsLoginResolver::login`] then performs one login against the AWS auth
//! backend and returns a [`TokenRecord`]. [`Provider`] ties both together
//! behind the declarative [`ProviderConfig`] / [`AuthTokenQuery`] inputs.

pub mod aws;
pub mod client;
pub mod common;
pub mod error;
pub mod login;
pub mod provider;

#[cfg(test)]
mod testing;

pub use client::{ServiceClient, VaultClient};
pub use common::{
    AuthTokenQuery, AwsCredentialMaterial, AwsLoginRequest, ConnectionSettings, ProviderConfig,
    SignedRequest, TokenRecord,
};
pub use error::{ConfigError, ConfigErrors, ConnectionError, LoginError};
pub use login::{login, AwsLoginResolver};
pub use provider::Provider;
