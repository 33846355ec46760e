use native_tls::{Certificate, Identity, TlsConnector};
use pkcs8::der::asn1::AnyRef;
use pkcs8::der::pem::{self, LineEnding};
use pkcs8::der::Encode;
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};
use rustls_pemfile::Item;
use sec1::EcPrivateKey;
use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::common::ConnectionSettings;
use crate::error::ConnectionError;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Builds the TLS connector for the configured CA material and client identity.
pub fn tls_connector(settings: &ConnectionSettings) -> Result<TlsConnector, ConnectionError> {
    let mut builder = TlsConnector::builder();

    let roots = load_ca_certificates(settings)?;
    if !roots.is_empty() {
        debug!("Using {} custom CA certificate(s)", roots.len());
        builder.disable_built_in_roots(true);
        for certificate in roots {
            builder.add_root_certificate(certificate);
        }
    }

    if let Some(client) = &settings.client_certificate {
        let cert = read_file(&client.cert_file)?;
        let key = read_file(&client.key_file)?;
        let key = pkcs8_key_pem(&key).map_err(|e| {
            ConnectionError::tls_config(format!("{}: {}", client.key_file.display(), e))
        })?;
        let identity = Identity::from_pkcs8(&cert, key.as_bytes()).map_err(|e| {
            ConnectionError::tls_config(format!(
                "failed to load client certificate {} with key {}: {}",
                client.cert_file.display(),
                client.key_file.display(),
                e
            ))
        })?;
        builder.identity(identity);
    }

    if settings.skip_tls_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }

    builder
        .build()
        .map_err(|e| ConnectionError::tls_config(e.to_string()))
}

/// The CA file wins over the CA directory when both are set.
fn load_ca_certificates(settings: &ConnectionSettings) -> Result<Vec<Certificate>, ConnectionError> {
    if let Some(ca_file) = &settings.ca_cert_file {
        return certificates_from_file(ca_file);
    }

    let Some(ca_dir) = &settings.ca_cert_dir else {
        return Ok(Vec::new());
    };

    let mut certificates = Vec::new();
    for entry in WalkDir::new(ca_dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ConnectionError::tls_config(format!("failed to read {}: {}", ca_dir.display(), e))
        })?;
        if entry.file_type().is_file() {
            certificates.extend(certificates_from_file(entry.path())?);
        }
    }
    if certificates.is_empty() {
        return Err(ConnectionError::tls_config(format!(
            "no CA certificates found in {}",
            ca_dir.display()
        )));
    }
    Ok(certificates)
}

fn certificates_from_file(path: &Path) -> Result<Vec<Certificate>, ConnectionError> {
    let bytes = read_file(path)?;
    let certificates = parse_pem_bundle(&bytes)
        .map_err(|e| ConnectionError::tls_config(format!("{}: {}", path.display(), e)))?;
    if certificates.is_empty() {
        return Err(ConnectionError::tls_config(format!(
            "couldn't parse PEM in {}",
            path.display()
        )));
    }
    Ok(certificates)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConnectionError> {
    fs::read(path).map_err(|e| {
        ConnectionError::tls_config(format!("failed to read {}: {}", path.display(), e))
    })
}

/// Every certificate in a PEM bundle. Other sections are skipped; an unterminated one is an error.
pub(crate) fn parse_pem_bundle(bytes: &[u8]) -> Result<Vec<Certificate>, String> {
    rustls_pemfile::certs(&mut &bytes[..])
        .map(|der| {
            let der = der.map_err(|e| e.to_string())?;
            Certificate::from_der(der.as_ref()).map_err(|e| e.to_string())
        })
        .collect()
}

/// Re-encodes the first private key in `bytes` as a PKCS#8 PEM document.
///
/// PKCS#8, PKCS#1 (`RSA PRIVATE KEY`) and SEC1 (`EC PRIVATE KEY`) keys are accepted.
pub(crate) fn pkcs8_key_pem(bytes: &[u8]) -> Result<String, String> {
    let mut reader = bytes;
    let der = loop {
        match rustls_pemfile::read_one(&mut reader).map_err(|e| e.to_string())? {
            Some(Item::Pkcs8Key(key)) => break key.secret_pkcs8_der().to_vec(),
            Some(Item::Pkcs1Key(key)) => {
                let algorithm = AlgorithmIdentifierRef {
                    oid: RSA_ENCRYPTION,
                    parameters: Some(AnyRef::NULL),
                };
                break wrap_private_key(algorithm, key.secret_pkcs1_der())?;
            }
            Some(Item::Sec1Key(key)) => break sec1_to_pkcs8(key.secret_sec1_der())?,
            Some(_) => continue,
            None => return Err("no private key found".to_string()),
        }
    };

    pem::encode_string("PRIVATE KEY", LineEnding::LF, &der).map_err(|e| e.to_string())
}

fn sec1_to_pkcs8(der: &[u8]) -> Result<Vec<u8>, String> {
    let key = EcPrivateKey::try_from(der).map_err(|e| e.to_string())?;
    let curve = key
        .parameters
        .and_then(|parameters| parameters.named_curve())
        .ok_or_else(|| "EC private key does not name its curve".to_string())?;

    let algorithm = AlgorithmIdentifierRef {
        oid: EC_PUBLIC_KEY,
        parameters: Some(AnyRef::from(&curve)),
    };
    wrap_private_key(algorithm, der)
}

fn wrap_private_key(algorithm: AlgorithmIdentifierRef<'_>, private_key: &[u8]) -> Result<Vec<u8>, String> {
    PrivateKeyInfo::new(algorithm, private_key)
        .to_der()
        .map_err(|e| e.to_string())
}
