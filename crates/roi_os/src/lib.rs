#![forbid(unsafe_code)]

pub mod anomaly_scan;
pub mod roi_runtime;

pub use roi_runtime::{RoiOpError, RoiRuntime};
