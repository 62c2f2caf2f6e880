#![forbid(unsafe_code)]

use std::io::Read;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::connection_string::{BlobConnection, BlobCredentials};
use crate::{BlobStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

pub const AZURE_STORAGE_API_VERSION: &str = "2021-08-06";

/// Blob service client speaking the REST protocol directly.
pub struct AzureBlobStore {
    connection: BlobConnection,
    agent: ureq::Agent,
}

impl AzureBlobStore {
    pub fn new(connection: BlobConnection, timeout_ms: u32) -> Self {
        let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("roi_storage/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { connection, agent }
    }

    fn blob_url(&self, container: &str, blob: &str) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.connection.blob_endpoint).map_err(|err| {
            StorageError::Config(format!("invalid blob endpoint: {err}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Config("blob endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .push(container)
            .push(blob);
        if let BlobCredentials::Sas { token } = &self.connection.credentials {
            url.set_query(Some(token));
        }
        Ok(url)
    }

    fn authorize(&self, request: ureq::Request, signing: &SigningInput<'_>) -> ureq::Request {
        let request = request
            .set("x-ms-date", signing.ms_date)
            .set("x-ms-version", AZURE_STORAGE_API_VERSION);
        match &self.connection.credentials {
            BlobCredentials::SharedKey { account_name, key } => {
                let signature = shared_key_signature(key, &string_to_sign(account_name, signing));
                request.set(
                    "Authorization",
                    &format!("SharedKey {account_name}:{signature}"),
                )
            }
            BlobCredentials::Sas { .. } => request,
        }
    }
}

impl BlobStore for AzureBlobStore {
    fn get(&self, container: &str, blob: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.blob_url(container, blob)?;
        let ms_date = rfc1123_now();
        let signing = SigningInput {
            verb: "GET",
            content_length: 0,
            content_type: "",
            ms_date: &ms_date,
            blob_type: None,
            url_path: url.path(),
        };
        let request = self.authorize(self.agent.get(url.as_str()), &signing);
        let response = request
            .call()
            .map_err(|err| storage_error_from_ureq(err, container, blob))?;
        // Whole body, uncapped: the history blob only grows.
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| StorageError::Transport(format!("failed reading blob body: {err}")))?;
        Ok(bytes)
    }

    fn put(
        &self,
        container: &str,
        blob: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        let url = self.blob_url(container, blob)?;
        let ms_date = rfc1123_now();
        let signing = SigningInput {
            verb: "PUT",
            content_length: bytes.len(),
            content_type,
            ms_date: &ms_date,
            blob_type: Some("BlockBlob"),
            url_path: url.path(),
        };
        let request = self
            .agent
            .put(url.as_str())
            .set("Content-Type", content_type)
            .set("x-ms-blob-type", "BlockBlob");
        self.authorize(request, &signing)
            .send_bytes(bytes)
            .map_err(|err| storage_error_from_ureq(err, container, blob))?;
        Ok(())
    }

    fn describe(&self) -> String {
        let auth = match self.connection.credentials {
            BlobCredentials::SharedKey { .. } => "shared_key",
            BlobCredentials::Sas { .. } => "sas",
        };
        format!("azure_blob:{} ({auth})", self.connection.blob_endpoint)
    }
}

#[derive(Debug, Clone, Copy)]
struct SigningInput<'a> {
    verb: &'a str,
    content_length: usize,
    content_type: &'a str,
    ms_date: &'a str,
    blob_type: Option<&'a str>,
    url_path: &'a str,
}

/// Shared Key string-to-sign for the blob service (2015-02-21 and later:
/// a zero content length is an empty line).
fn string_to_sign(account_name: &str, input: &SigningInput<'_>) -> String {
    let content_length = if input.content_length == 0 {
        String::new()
    } else {
        input.content_length.to_string()
    };
    let mut canonical_headers = String::new();
    if let Some(blob_type) = input.blob_type {
        canonical_headers.push_str(&format!("x-ms-blob-type:{blob_type}\n"));
    }
    canonical_headers.push_str(&format!("x-ms-date:{}\n", input.ms_date));
    canonical_headers.push_str(&format!("x-ms-version:{AZURE_STORAGE_API_VERSION}\n"));

    format!(
        "{verb}\n\n\n{content_length}\n\n{content_type}\n\n\n\n\n\n\n{canonical_headers}/{account_name}{path}",
        verb = input.verb,
        content_type = input.content_type,
        path = input.url_path,
    )
}

fn shared_key_signature(key: &[u8], string_to_sign: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn storage_error_from_ureq(err: ureq::Error, container: &str, blob: &str) -> StorageError {
    match err {
        ureq::Error::Status(404, response)
            if response.header("x-ms-error-code") != Some("ContainerNotFound") =>
        {
            StorageError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            }
        }
        ureq::Error::Status(status, response) => StorageError::Http {
            status,
            detail: response
                .header("x-ms-error-code")
                .unwrap_or("unknown")
                .to_string(),
        },
        ureq::Error::Transport(transport) => StorageError::Transport(transport.to_string()),
    }
}
