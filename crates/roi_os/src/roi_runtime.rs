#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use roi_engines::anomaly::{AnomalyDetector, DetectorError};
use roi_engines::roi_calc::compute_roi;
use roi_kernel_contracts::anomaly::AnomaliesResponse;
use roi_kernel_contracts::roi::{RoiCalculationRequest, RoiCalculationResult, RoiHistoryResponse};
use roi_kernel_contracts::ContractViolation;
use roi_storage::{HistoryStore, StorageError};
use thiserror::Error;

use crate::anomaly_scan::{build_series, select_flagged};

pub const MISSING_FIELDS_MESSAGE: &str = "Missing input fields";
pub const DETECTOR_FAILED_MESSAGE: &str = "Anomaly Detector API failed";

#[derive(Debug, Error)]
pub enum RoiOpError {
    #[error("Missing input fields")]
    MissingFields(Vec<&'static str>),
    #[error("{0}")]
    Contract(ContractViolation),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Scan(String),
    #[error("{0}")]
    Detector(DetectorError),
}

impl From<ContractViolation> for RoiOpError {
    fn from(v: ContractViolation) -> Self {
        match v {
            ContractViolation::MissingFields { fields } => RoiOpError::MissingFields(fields),
            other => RoiOpError::Contract(other),
        }
    }
}

impl From<DetectorError> for RoiOpError {
    fn from(err: DetectorError) -> Self {
        RoiOpError::Detector(err)
    }
}

impl RoiOpError {
    /// HTTP status for this failure: 400 for absent fields, the detector's
    /// own status for detector rejections, 500 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            RoiOpError::MissingFields(_) => 400,
            RoiOpError::Detector(DetectorError::Status { status }) => *status,
            _ => 500,
        }
    }

    /// Text placed in the `error` field of the response body.
    pub fn public_message(&self) -> String {
        match self {
            RoiOpError::Detector(DetectorError::Status { .. }) => {
                DETECTOR_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// The three request operations over a shared history store and detector.
/// Holds no per-request state.
pub struct RoiRuntime {
    history: HistoryStore,
    detector: Arc<dyn AnomalyDetector>,
}

impl RoiRuntime {
    pub fn new(history: HistoryStore, detector: Arc<dyn AnomalyDetector>) -> Self {
        Self { history, detector }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn detector_configured(&self) -> bool {
        self.detector.is_configured()
    }

    pub fn calculate_roi(
        &self,
        request: RoiCalculationRequest,
    ) -> Result<RoiCalculationResult, RoiOpError> {
        self.calculate_roi_at(request, local_timestamp_now())
    }

    /// Same as [`RoiRuntime::calculate_roi`] with a caller-supplied timestamp.
    pub fn calculate_roi_at(
        &self,
        request: RoiCalculationRequest,
        timestamp: String,
    ) -> Result<RoiCalculationResult, RoiOpError> {
        let inputs = request.to_inputs().map_err(|violation| {
            tracing::info!(%violation, "roi calculation rejected");
            RoiOpError::from(violation)
        })?;
        let record = compute_roi(&inputs)?.into_record(&inputs, timestamp)?;
        let history_len = self.history.append(&record).map_err(|err| {
            tracing::error!(error = %err, "failed to persist roi record");
            RoiOpError::from(err)
        })?;
        tracing::info!(
            roi = %record.roi,
            industry_type = %record.industry_type,
            history_len,
            "roi calculated"
        );
        Ok(RoiCalculationResult::from(&record))
    }

    pub fn get_roi_data(&self) -> Result<RoiHistoryResponse, RoiOpError> {
        let roi_data = self.history.load().map_err(|err| {
            tracing::error!(error = %err, "failed to load roi history");
            RoiOpError::from(err)
        })?;
        tracing::info!(entries = roi_data.len(), "roi history served");
        Ok(RoiHistoryResponse { roi_data })
    }

    pub fn detect_anomalies(&self) -> Result<AnomaliesResponse, RoiOpError> {
        let history = self.history.load().map_err(|err| {
            tracing::error!(error = %err, "failed to load roi history for anomaly scan");
            RoiOpError::from(err)
        })?;
        let series = build_series(&history).map_err(RoiOpError::Scan)?;
        let flags = self.detector.detect(&series).map_err(|err| {
            tracing::error!(error = %err, points = series.len(), "anomaly detector call failed");
            RoiOpError::from(err)
        })?;
        let anomalies = select_flagged(&history, &flags).map_err(|reason| {
            tracing::error!(%reason, points = series.len(), "detector flags do not match history");
            RoiOpError::Scan(reason)
        })?;
        tracing::info!(
            points = series.len(),
            anomalies = anomalies.len(),
            "anomaly scan complete"
        );
        Ok(AnomaliesResponse { anomalies })
    }
}

/// Server-local wall clock, `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn local_timestamp_now() -> String {
    format_timestamp(chrono::Local::now().naive_local())
}

/// The fraction is omitted when the microsecond part is zero.
pub fn format_timestamp(at: NaiveDateTime) -> String {
    if at.nanosecond() / 1_000 == 0 {
        at.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}
