#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::{ContractViolation, Validate};

/// Divisor of the readiness score: three factors on a five-point scale.
pub const READINESS_SCALE_MAX: f64 = 15.0;

pub const REQUIRED_FIELDS: [&str; 11] = [
    "project_budget",
    "employee_impact",
    "project_duration",
    "average_salary",
    "risk_level",
    "industry_type",
    "previous_success",
    "leadership_alignment",
    "employee_readiness",
    "communication_plan",
    "training_budget",
];

/// Raw calculator request body.
///
/// Every field is kept as an untyped JSON value so that presence is checked
/// before type. A JSON `null` deserializes to `None` and counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoiCalculationRequest {
    #[serde(default)]
    pub project_budget: Option<Value>,
    #[serde(default)]
    pub employee_impact: Option<Value>,
    #[serde(default)]
    pub project_duration: Option<Value>,
    #[serde(default)]
    pub average_salary: Option<Value>,
    #[serde(default)]
    pub risk_level: Option<Value>,
    #[serde(default)]
    pub industry_type: Option<Value>,
    #[serde(default)]
    pub previous_success: Option<Value>,
    #[serde(default)]
    pub leadership_alignment: Option<Value>,
    #[serde(default)]
    pub employee_readiness: Option<Value>,
    #[serde(default)]
    pub communication_plan: Option<Value>,
    #[serde(default)]
    pub training_budget: Option<Value>,
}

impl RoiCalculationRequest {
    fn field(&self, name: &str) -> Option<&Value> {
        match name {
            "project_budget" => self.project_budget.as_ref(),
            "employee_impact" => self.employee_impact.as_ref(),
            "project_duration" => self.project_duration.as_ref(),
            "average_salary" => self.average_salary.as_ref(),
            "risk_level" => self.risk_level.as_ref(),
            "industry_type" => self.industry_type.as_ref(),
            "previous_success" => self.previous_success.as_ref(),
            "leadership_alignment" => self.leadership_alignment.as_ref(),
            "employee_readiness" => self.employee_readiness.as_ref(),
            "communication_plan" => self.communication_plan.as_ref(),
            "training_budget" => self.training_budget.as_ref(),
            _ => None,
        }
    }

    /// Required fields that are absent or `null`, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| matches!(self.field(name), None | Some(Value::Null)))
            .collect()
    }

    /// Presence check followed by type coercion of the fields the formula reads.
    ///
    /// `risk_level` and `training_budget` only take part in the presence check.
    pub fn to_inputs(&self) -> Result<RoiInputs, ContractViolation> {
        self.validate()?;
        Ok(RoiInputs {
            project_budget: self.number("project_budget")?,
            employee_impact: self.number("employee_impact")?,
            project_duration: self.number("project_duration")?,
            average_salary: self.number("average_salary")?,
            previous_success: self.number("previous_success")?,
            leadership_alignment: self.number("leadership_alignment")?,
            employee_readiness: self.number("employee_readiness")?,
            communication_plan: self.number("communication_plan")?,
            industry_type: match self.field("industry_type") {
                Some(Value::String(s)) => s.clone(),
                _ => {
                    return Err(ContractViolation::NotString {
                        field: "industry_type",
                    })
                }
            },
        })
    }

    fn number(&self, field: &'static str) -> Result<Number, ContractViolation> {
        match self.field(field) {
            Some(Value::Number(n)) => Ok(n.clone()),
            _ => Err(ContractViolation::NotNumber { field }),
        }
    }
}

impl Validate for RoiCalculationRequest {
    fn validate(&self) -> Result<(), ContractViolation> {
        let fields = self.missing_fields();
        if fields.is_empty() {
            Ok(())
        } else {
            Err(ContractViolation::MissingFields { fields })
        }
    }
}

/// Typed calculator inputs. Numbers keep their JSON representation so the
/// echoed fields round-trip unchanged (an integer budget stays an integer).
#[derive(Debug, Clone, PartialEq)]
pub struct RoiInputs {
    pub project_budget: Number,
    pub employee_impact: Number,
    pub project_duration: Number,
    pub average_salary: Number,
    pub previous_success: Number,
    pub leadership_alignment: Number,
    pub employee_readiness: Number,
    pub communication_plan: Number,
    pub industry_type: String,
}

/// One persisted history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub project_budget: Number,
    pub net_benefit: Number,
    pub roi: Number,
    pub expected_success: Number,
    pub industry_type: String,
    pub project_duration: Number,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiCalculationResult {
    pub roi: Number,
    pub net_benefit: Number,
    pub expected_success: Number,
    pub industry_type: String,
    pub project_duration: Number,
}

impl From<&RoiRecord> for RoiCalculationResult {
    fn from(record: &RoiRecord) -> Self {
        Self {
            roi: record.roi.clone(),
            net_benefit: record.net_benefit.clone(),
            expected_success: record.expected_success.clone(),
            industry_type: record.industry_type.clone(),
            project_duration: record.project_duration.clone(),
        }
    }
}

/// History as stored. Entries are returned verbatim, whatever their shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiHistoryResponse {
    pub roi_data: Vec<Value>,
}
