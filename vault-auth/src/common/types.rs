use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Secret as returned by the Vault HTTP API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub lease_id: String,

    #[serde(default)]
    pub lease_duration: i64,

    #[serde(default)]
    pub renewable: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Authentication block of a [`Secret`].
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretAuth {
    #[serde(default)]
    pub client_token: String,

    #[serde(default)]
    pub accessor: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub lease_duration: i64,

    #[serde(default)]
    pub renewable: bool,
}

impl fmt::Debug for SecretAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretAuth")
            .field("client_token", &"<redacted>")
            .field("accessor", &self.accessor)
            .field("policies", &self.policies)
            .field("metadata", &self.metadata)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Token obtained from one successful login.
#[derive(Clone, PartialEq, Serialize)]
pub struct TokenRecord {
    /// `nonce:<nonce>` when the auth metadata carries a nonce, otherwise `accessor:<accessor>`.
    pub id: String,
    pub lease_id: String,
    /// Lease duration in seconds relative to `lease_start_time`.
    pub lease_duration: i64,
    /// Local clock reading taken when the login response was received.
    #[serde(serialize_with = "rfc3339")]
    pub lease_start_time: DateTime<Utc>,
    pub renewable: bool,
    pub metadata: HashMap<String, String>,
    pub policies: Vec<String>,
    pub accessor: String,
    pub client_token: String,
    pub nonce: String,
}

impl TokenRecord {
    pub const NONCE_KEY: &'static str = "nonce";

    /// Builds a record from a login response's auth block.
    pub fn from_auth(lease_id: String, auth: SecretAuth, received_at: DateTime<Utc>) -> Self {
        let nonce = auth.metadata.get(Self::NONCE_KEY).cloned();
        let id = match &nonce {
            Some(nonce) => format!("nonce:{}", nonce),
            None => format!("accessor:{}", auth.accessor),
        };

        Self {
            id,
            lease_id,
            lease_duration: auth.lease_duration,
            lease_start_time: received_at,
            renewable: auth.renewable,
            metadata: auth.metadata,
            policies: auth.policies,
            accessor: auth.accessor,
            client_token: auth.client_token,
            nonce: nonce.unwrap_or_default(),
        }
    }

    pub fn lease_start_time_rfc3339(&self) -> String {
        self.lease_start_time
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("id", &self.id)
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("lease_start_time", &self.lease_start_time_rfc3339())
            .field("renewable", &self.renewable)
            .field("metadata", &self.metadata)
            .field("policies", &self.policies)
            .field("accessor", &self.accessor)
            .field("client_token", &"<redacted>")
            .field("nonce", &self.nonce)
            .finish()
    }
}

fn rfc3339<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}
