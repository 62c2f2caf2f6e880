#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::StorageError;

pub const DEV_STORAGE_ACCOUNT: &str = "devstoreaccount1";
pub const DEV_STORAGE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
pub const DEV_STORAGE_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// How requests to the blob service are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum BlobCredentials {
    SharedKey { account_name: String, key: Vec<u8> },
    Sas { token: String },
}

impl fmt::Debug for BlobCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobCredentials::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("key", &"<redacted>")
                .finish(),
            BlobCredentials::Sas { .. } => f
                .debug_struct("Sas")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobConnection {
    /// Service root without trailing slash, e.g. `https://acct.blob.core.windows.net`.
    pub blob_endpoint: String,
    pub credentials: BlobCredentials,
}

/// Parses an Azure storage connection string.
///
/// Supported shapes: account name + key (optionally with an explicit
/// `BlobEndpoint`), `BlobEndpoint` + `SharedAccessSignature`, and
/// `UseDevelopmentStorage=true`.
pub fn parse_connection_string(raw: &str) -> Result<BlobConnection, StorageError> {
    let mut parts: BTreeMap<String, String> = BTreeMap::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            StorageError::Config(format!(
                "connection string segment without '=': '{}'",
                redact_segment(segment)
            ))
        })?;
        parts.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if parts
        .get("usedevelopmentstorage")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(BlobConnection {
            blob_endpoint: DEV_STORAGE_BLOB_ENDPOINT.to_string(),
            credentials: BlobCredentials::SharedKey {
                account_name: DEV_STORAGE_ACCOUNT.to_string(),
                key: decode_key(DEV_STORAGE_KEY)?,
            },
        });
    }

    let explicit_endpoint = parts
        .get("blobendpoint")
        .map(|v| v.trim_end_matches('/').to_string());

    if let Some(sas) = parts.get("sharedaccesssignature") {
        let blob_endpoint = explicit_endpoint.ok_or_else(|| {
            StorageError::Config("SharedAccessSignature requires BlobEndpoint".to_string())
        })?;
        return Ok(BlobConnection {
            blob_endpoint,
            credentials: BlobCredentials::Sas {
                token: sas.trim_start_matches('?').to_string(),
            },
        });
    }

    let account_name = parts
        .get("accountname")
        .cloned()
        .ok_or_else(|| StorageError::Config("connection string is missing AccountName".to_string()))?;
    let account_key = parts
        .get("accountkey")
        .ok_or_else(|| StorageError::Config("connection string is missing AccountKey".to_string()))?;
    let blob_endpoint = match explicit_endpoint {
        Some(endpoint) => endpoint,
        None => {
            let protocol = parts
                .get("defaultendpointsprotocol")
                .map(String::as_str)
                .unwrap_or("https");
            let suffix = parts
                .get("endpointsuffix")
                .map(String::as_str)
                .unwrap_or("core.windows.net");
            format!("{protocol}://{account_name}.blob.{suffix}")
        }
    };
    Ok(BlobConnection {
        blob_endpoint,
        credentials: BlobCredentials::SharedKey {
            key: decode_key(account_key)?,
            account_name,
        },
    })
}

fn decode_key(raw: &str) -> Result<Vec<u8>, StorageError> {
    STANDARD
        .decode(raw)
        .map_err(|_| StorageError::Config("AccountKey is not valid base64".to_string()))
}

fn redact_segment(segment: &str) -> String {
    segment.chars().take(12).collect::<String>() + "..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_conn_01_account_key_builds_default_endpoint() {
        let conn = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=roiacct;AccountKey=AAECAw==;EndpointSuffix=core.windows.net",
        )
        .expect("valid connection string");
        assert_eq!(conn.blob_endpoint, "https://roiacct.blob.core.windows.net");
        assert_eq!(
            conn.credentials,
            BlobCredentials::SharedKey {
                account_name: "roiacct".to_string(),
                key: vec![0, 1, 2, 3],
            }
        );
    }

    #[test]
    fn at_conn_02_sas_requires_blob_endpoint() {
        let conn = parse_connection_string(
            "BlobEndpoint=https://roiacct.blob.core.windows.net/;SharedAccessSignature=?sv=2021&sig=abc",
        )
        .expect("valid sas connection string");
        assert_eq!(conn.blob_endpoint, "https://roiacct.blob.core.windows.net");
        assert_eq!(
            conn.credentials,
            BlobCredentials::Sas {
                token: "sv=2021&sig=abc".to_string()
            }
        );
        assert!(parse_connection_string("SharedAccessSignature=sv=1").is_err());
    }

    #[test]
    fn at_conn_03_development_storage_uses_emulator() {
        let conn = parse_connection_string("UseDevelopmentStorage=true").expect("dev storage");
        assert_eq!(conn.blob_endpoint, DEV_STORAGE_BLOB_ENDPOINT);
        assert!(matches!(
            conn.credentials,
            BlobCredentials::SharedKey { ref account_name, .. } if account_name == DEV_STORAGE_ACCOUNT
        ));
    }

    #[test]
    fn at_conn_04_missing_key_and_bad_base64_fail() {
        assert!(matches!(
            parse_connection_string("AccountName=a"),
            Err(StorageError::Config(_))
        ));
        assert!(matches!(
            parse_connection_string("AccountName=a;AccountKey=***"),
            Err(StorageError::Config(_))
        ));
        assert!(parse_connection_string("garbage").is_err());
    }

    #[test]
    fn at_conn_05_debug_output_redacts_secrets() {
        let conn = parse_connection_string("AccountName=a;AccountKey=c2VjcmV0")
            .expect("valid connection string");
        let rendered = format!("{conn:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("115, 101"));
    }
}
