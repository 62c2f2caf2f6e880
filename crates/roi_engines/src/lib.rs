#![forbid(unsafe_code)]

pub mod anomaly;
pub mod roi_calc;
