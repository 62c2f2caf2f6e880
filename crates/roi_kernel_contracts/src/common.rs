#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    /// One or more required fields were absent or JSON `null`.
    MissingFields { fields: Vec<&'static str> },
    NotNumber { field: &'static str },
    NotString { field: &'static str },
    NotFinite { field: &'static str },
    DivisionByZero { field: &'static str },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::MissingFields { fields } => {
                write!(f, "missing input fields: {}", fields.join(", "))
            }
            ContractViolation::NotNumber { field } => {
                write!(f, "field '{field}' must be a number")
            }
            ContractViolation::NotString { field } => {
                write!(f, "field '{field}' must be a string")
            }
            ContractViolation::NotFinite { field } => {
                write!(f, "computed value '{field}' is not a finite number")
            }
            ContractViolation::DivisionByZero { field } => {
                write!(f, "division by zero: '{field}' must be non-zero")
            }
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}
