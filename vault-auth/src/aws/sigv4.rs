use aws_credential_types::Credentials;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::client::Payload;
use crate::error::MetadataAuthError;

type HmacSha256 = Hmac<Sha256>;

pub const STS_SERVICE: &str = "sts";
pub const GET_CALLER_IDENTITY_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
pub const IAM_SERVER_ID_HEADER: &str = "X-Vault-AWS-IAM-Server-ID";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// A signed `sts:GetCallerIdentity` request, ready to hand to Vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsLoginData {
    pub method: String,
    pub url: String,
    pub body: String,
    pub headers: BTreeMap<String, Vec<String>>,
}

impl StsLoginData {
    /// Encodes the request the way the AWS auth backend's `iam` login expects.
    pub fn into_login_payload(self) -> Result<Payload, MetadataAuthError> {
        let headers = serde_json::to_vec(&self.headers)
            .map_err(|e| MetadataAuthError::signing(e.to_string()))?;

        let mut payload = Payload::new();
        payload.insert(
            "iam_http_request_method".to_string(),
            Value::String(self.method),
        );
        payload.insert(
            "iam_request_url".to_string(),
            Value::String(STANDARD.encode(self.url)),
        );
        payload.insert(
            "iam_request_body".to_string(),
            Value::String(STANDARD.encode(self.body)),
        );
        payload.insert(
            "iam_request_headers".to_string(),
            Value::String(STANDARD.encode(headers)),
        );
        Ok(payload)
    }
}

/// STS host for `region`; `us-east-1` uses the global endpoint.
pub fn sts_host(region: &str) -> String {
    if region == "us-east-1" {
        "sts.amazonaws.com".to_string()
    } else {
        format!("sts.{}.amazonaws.com", region)
    }
}

/// Signs a `POST` `GetCallerIdentity` request with SigV4 headers.
pub fn sign_get_caller_identity(
    credentials: &Credentials,
    region: &str,
    server_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<StsLoginData, MetadataAuthError> {
    let host = sts_host(region);
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = &amz_date[..8];

    // Canonical headers must be sorted by lowercase name.
    let mut signed: BTreeMap<String, String> = BTreeMap::new();
    signed.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
    signed.insert("host".to_string(), host.clone());
    signed.insert("x-amz-date".to_string(), amz_date.clone());
    if let Some(token) = credentials.session_token() {
        signed.insert("x-amz-security-token".to_string(), token.to_string());
    }
    if let Some(server_id) = server_id {
        signed.insert(IAM_SERVER_ID_HEADER.to_lowercase(), server_id.trim().to_string());
    }

    let canonical = canonical_request("POST", &signed, GET_CALLER_IDENTITY_BODY);
    let signed_headers = signed.keys().cloned().collect::<Vec<_>>().join(";");

    let scope = format!("{}/{}/{}/aws4_request", date_stamp, region, STS_SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        sha256_hex(canonical.as_bytes())
    );

    let key = signing_key(
        credentials.secret_access_key(),
        date_stamp,
        region,
        STS_SERVICE,
    )?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id(),
        scope,
        signed_headers,
        signature
    );

    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), vec![authorization]);
    headers.insert(
        "Content-Type".to_string(),
        vec![FORM_CONTENT_TYPE.to_string()],
    );
    headers.insert("X-Amz-Date".to_string(), vec![amz_date]);
    if let Some(token) = credentials.session_token() {
        headers.insert("X-Amz-Security-Token".to_string(), vec![token.to_string()]);
    }
    if let Some(server_id) = server_id {
        headers.insert(
            IAM_SERVER_ID_HEADER.to_string(),
            vec![server_id.trim().to_string()],
        );
    }

    Ok(StsLoginData {
        method: "POST".to_string(),
        url: format!("https://{}/", host),
        body: GET_CALLER_IDENTITY_BODY.to_string(),
        headers,
    })
}

pub(crate) fn canonical_request(
    method: &str,
    headers: &BTreeMap<String, String>,
    body: &str,
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    format!(
        "{}\n/\n\n{}\n{}\n{}",
        method,
        canonical_headers,
        signed_headers,
        sha256_hex(body.as_bytes())
    )
}

pub(crate) fn signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, MetadataAuthError> {
    let k_date = hmac(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, MetadataAuthError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| MetadataAuthError::signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
