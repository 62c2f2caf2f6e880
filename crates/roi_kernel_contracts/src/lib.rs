#![forbid(unsafe_code)]

pub mod anomaly;
pub mod common;
pub mod roi;

pub use common::{ContractViolation, Validate};
