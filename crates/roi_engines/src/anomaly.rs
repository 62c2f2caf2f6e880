#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use roi_kernel_contracts::anomaly::{AnomalyDetectRequest, AnomalyDetectResponse, SeriesPoint};
use thiserror::Error;

pub const ANOMALY_DETECT_PATH: &str = "/anomalydetector/v1.1/timeseries/entire/detect";
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
pub const DEFAULT_OUTBOUND_TIMEOUT_MS: u32 = 30_000;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("anomaly detector returned status {status}")]
    Status { status: u16 },
    #[error("anomaly detector transport failure: {0}")]
    Transport(String),
    #[error("anomaly detector response could not be decoded: {0}")]
    Decode(String),
    #[error("anomaly detector is not configured: {0}")]
    Config(String),
}

/// Submit an ordered numeric series, get back one flag per point.
pub trait AnomalyDetector: Send + Sync {
    fn detect(&self, series: &[SeriesPoint]) -> Result<Vec<bool>, DetectorError>;

    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AnomalyDetectorConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub granularity: Option<String>,
    pub timeout_ms: u32,
}

// Hand-written so the key never reaches logs.
impl std::fmt::Debug for AnomalyDetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetectorConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("granularity", &self.granularity)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl AnomalyDetectorConfig {
    pub fn from_env() -> Self {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(mut env_getter: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut non_empty = |key: &str| {
            env_getter(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let endpoint = non_empty("AnomalyDetectorEndpoint");
        let api_key = non_empty("AnomalyDetectorKey");
        let granularity = non_empty("AnomalyDetectorGranularity");
        let timeout_ms = parse_outbound_timeout_ms(non_empty("ROI_OUTBOUND_TIMEOUT_MS"));
        Self {
            endpoint,
            api_key,
            granularity,
            timeout_ms,
        }
    }

    pub fn detect_url(&self) -> Option<String> {
        self.endpoint
            .as_deref()
            .map(|endpoint| format!("{}{}", endpoint.trim_end_matches('/'), ANOMALY_DETECT_PATH))
    }
}

/// Accepts 100..=300000 ms; anything else falls back to the default.
pub fn parse_outbound_timeout_ms(raw: Option<String>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| (100..=300_000).contains(v))
        .unwrap_or(DEFAULT_OUTBOUND_TIMEOUT_MS)
}

/// Client for the Azure "entire series" detection endpoint.
pub struct AzureAnomalyDetectorClient {
    config: AnomalyDetectorConfig,
    agent: ureq::Agent,
}

impl AzureAnomalyDetectorClient {
    pub fn new(config: AnomalyDetectorConfig) -> Self {
        let agent = build_http_agent(config.timeout_ms);
        Self { config, agent }
    }

    pub fn config(&self) -> &AnomalyDetectorConfig {
        &self.config
    }
}

impl AnomalyDetector for AzureAnomalyDetectorClient {
    fn detect(&self, series: &[SeriesPoint]) -> Result<Vec<bool>, DetectorError> {
        let url = self.config.detect_url().ok_or_else(|| {
            DetectorError::Config("AnomalyDetectorEndpoint is not set".to_string())
        })?;
        let payload = AnomalyDetectRequest {
            series: series.to_vec(),
            granularity: self.config.granularity.clone(),
        };
        let mut request = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json");
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.set(SUBSCRIPTION_KEY_HEADER, key);
        }
        tracing::debug!(points = series.len(), "submitting series to anomaly detector");

        let response = match request.send_json(&payload) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => return Err(DetectorError::Status { status }),
            Err(ureq::Error::Transport(transport)) => {
                return Err(DetectorError::Transport(transport.to_string()))
            }
        };
        if response.status() != 200 {
            return Err(DetectorError::Status {
                status: response.status(),
            });
        }
        let decoded: AnomalyDetectResponse = response
            .into_json()
            .map_err(|err| DetectorError::Decode(err.to_string()))?;
        Ok(decoded.is_anomaly)
    }

    fn is_configured(&self) -> bool {
        self.config.endpoint.is_some()
    }
}

fn build_http_agent(timeout_ms: u32) -> ureq::Agent {
    let timeout = Duration::from_millis(u64::from(timeout_ms).max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("roi_engines/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serves one canned response and hands back the raw request it received.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub detector");
        let addr = listener.local_addr().expect("stub addr");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((k, v)) = line.split_once(':') {
                    if k.eq_ignore_ascii_case("content-length") {
                        content_length = v.trim().parse().unwrap_or(0);
                    }
                }
                head.push_str(&line);
            }
            let mut body_buf = vec![0u8; content_length];
            reader.read_exact(&mut body_buf).expect("read body");
            let _ = tx.send(format!("{head}\r\n{}", String::from_utf8_lossy(&body_buf)));
            let mut stream = stream;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
        });
        (format!("http://{addr}"), rx)
    }

    fn config(endpoint: Option<String>) -> AnomalyDetectorConfig {
        AnomalyDetectorConfig {
            endpoint,
            api_key: Some("test-key".to_string()),
            granularity: None,
            timeout_ms: 5_000,
        }
    }

    fn series() -> Vec<SeriesPoint> {
        vec![
            SeriesPoint {
                timestamp: "2024-01-01 00:00:00.000000".to_string(),
                value: 10.0,
            },
            SeriesPoint {
                timestamp: "2024-01-02 00:00:00.000000".to_string(),
                value: 900.0,
            },
        ]
    }

    #[test]
    fn at_detector_01_posts_series_with_key_and_reads_flags() {
        let (endpoint, rx) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"isAnomaly":[false,true],"expectedValues":[10.0,10.0]}"#,
        );
        let client = AzureAnomalyDetectorClient::new(config(Some(format!("{endpoint}/"))));
        let flags = client.detect(&series()).expect("detector call must succeed");
        assert_eq!(flags, vec![false, true]);

        let raw = rx.recv().expect("stub must capture request");
        assert!(raw.starts_with(&format!("POST {ANOMALY_DETECT_PATH} HTTP/1.1")));
        assert!(raw
            .to_ascii_lowercase()
            .contains("ocp-apim-subscription-key: test-key"));
        let body = raw.split("\r\n\r\n").nth(1).expect("request body");
        let sent: serde_json::Value = serde_json::from_str(body).expect("json body");
        assert_eq!(sent["series"][1]["value"], 900.0);
        assert!(sent.get("granularity").is_none());
    }

    #[test]
    fn at_detector_02_non_success_status_is_surfaced() {
        let (endpoint, _rx) = serve_once("HTTP/1.1 401 Unauthorized", r#"{"code":"401"}"#);
        let client = AzureAnomalyDetectorClient::new(config(Some(endpoint)));
        match client.detect(&series()) {
            Err(DetectorError::Status { status }) => assert_eq!(status, 401),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn at_detector_03_missing_endpoint_is_a_config_error() {
        let client = AzureAnomalyDetectorClient::new(config(None));
        assert!(!client.is_configured());
        assert!(matches!(
            client.detect(&series()),
            Err(DetectorError::Config(_))
        ));
    }

    #[test]
    fn at_detector_04_env_map_trims_and_defaults() {
        let vars: BTreeMap<&str, &str> = BTreeMap::from([
            ("AnomalyDetectorEndpoint", " https://detector.example.com/ "),
            ("AnomalyDetectorKey", "k"),
            ("AnomalyDetectorGranularity", ""),
            ("ROI_OUTBOUND_TIMEOUT_MS", "50"),
        ]);
        let cfg = AnomalyDetectorConfig::from_env_var_map(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(
            cfg.detect_url().as_deref(),
            Some("https://detector.example.com/anomalydetector/v1.1/timeseries/entire/detect")
        );
        assert_eq!(cfg.granularity, None);
        assert_eq!(cfg.timeout_ms, DEFAULT_OUTBOUND_TIMEOUT_MS);
        assert!(!format!("{cfg:?}").contains("\"k\""));
    }

    #[test]
    fn at_detector_05_missing_flags_decode_as_empty() {
        let (endpoint, _rx) = serve_once("HTTP/1.1 200 OK", r#"{"period":0}"#);
        let client = AzureAnomalyDetectorClient::new(config(Some(endpoint)));
        assert_eq!(client.detect(&series()).expect("ok"), Vec::<bool>::new());
    }
}
