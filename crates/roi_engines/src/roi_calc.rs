#![forbid(unsafe_code)]

use roi_kernel_contracts::roi::{RoiInputs, RoiRecord, READINESS_SCALE_MAX};
use roi_kernel_contracts::ContractViolation;
use serde_json::Number;

/// Intermediate and final values of one ROI evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiOutcome {
    pub readiness_score: f64,
    pub expected_success: f64,
    pub productivity_gain: f64,
    pub net_benefit: f64,
    pub roi: f64,
}

/// Evaluates the closed-form ROI model.
///
/// The operation order is fixed; changing it changes the low bits of the
/// result. A zero budget is rejected instead of producing an infinite ROI.
pub fn compute_roi(inputs: &RoiInputs) -> Result<RoiOutcome, ContractViolation> {
    let project_budget = as_f64(&inputs.project_budget);
    if project_budget == 0.0 {
        return Err(ContractViolation::DivisionByZero {
            field: "project_budget",
        });
    }

    let readiness_score = (as_f64(&inputs.leadership_alignment)
        + as_f64(&inputs.employee_readiness)
        + as_f64(&inputs.communication_plan))
        / READINESS_SCALE_MAX;
    let expected_success = as_f64(&inputs.previous_success) * readiness_score;

    let productivity_gain = as_f64(&inputs.employee_impact)
        * as_f64(&inputs.average_salary)
        * as_f64(&inputs.project_duration);
    let net_benefit = productivity_gain * (expected_success / 100.0) - project_budget;
    let roi = (net_benefit / project_budget) * 100.0;

    Ok(RoiOutcome {
        readiness_score,
        expected_success,
        productivity_gain,
        net_benefit,
        roi,
    })
}

impl RoiOutcome {
    /// Builds the persisted record. Non-finite results cannot be stored as JSON
    /// and are rejected here.
    pub fn into_record(
        self,
        inputs: &RoiInputs,
        timestamp: String,
    ) -> Result<RoiRecord, ContractViolation> {
        Ok(RoiRecord {
            project_budget: inputs.project_budget.clone(),
            net_benefit: finite_number("net_benefit", self.net_benefit)?,
            roi: finite_number("roi", self.roi)?,
            expected_success: finite_number("expected_success", self.expected_success)?,
            industry_type: inputs.industry_type.clone(),
            project_duration: inputs.project_duration.clone(),
            timestamp,
        })
    }
}

fn as_f64(n: &Number) -> f64 {
    // Every serde_json number (without arbitrary_precision) has an f64 view.
    n.as_f64().unwrap_or(f64::NAN)
}

fn finite_number(field: &'static str, value: f64) -> Result<Number, ContractViolation> {
    Number::from_f64(value).ok_or(ContractViolation::NotFinite { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Number {
        Number::from_f64(v).expect("test inputs are finite")
    }

    fn inputs(
        budget: f64,
        impact: f64,
        duration: f64,
        salary: f64,
        previous: f64,
        scores: (f64, f64, f64),
    ) -> RoiInputs {
        RoiInputs {
            project_budget: num(budget),
            employee_impact: num(impact),
            project_duration: num(duration),
            average_salary: num(salary),
            previous_success: num(previous),
            leadership_alignment: num(scores.0),
            employee_readiness: num(scores.1),
            communication_plan: num(scores.2),
            industry_type: "Tech".to_string(),
        }
    }

    #[test]
    fn at_roi_calc_01_reference_example() {
        let out = compute_roi(&inputs(100_000.0, 10.0, 2.0, 50_000.0, 80.0, (4.0, 4.0, 4.0)))
            .expect("non-zero budget must compute");
        assert_eq!(out.readiness_score, 12.0 / 15.0);
        assert_eq!(out.expected_success, 64.0);
        assert_eq!(out.productivity_gain, 1_000_000.0);
        assert_eq!(out.net_benefit, 540_000.0);
        assert_eq!(out.roi, 540.0);
    }

    #[test]
    fn at_roi_calc_02_integer_inputs_match_float_inputs() {
        let ints = RoiInputs {
            project_budget: Number::from(100_000u64),
            employee_impact: Number::from(10u64),
            project_duration: Number::from(2u64),
            average_salary: Number::from(50_000u64),
            previous_success: Number::from(80u64),
            leadership_alignment: Number::from(4u64),
            employee_readiness: Number::from(4u64),
            communication_plan: Number::from(4u64),
            industry_type: "Tech".to_string(),
        };
        let a = compute_roi(&ints).expect("ints compute");
        let b = compute_roi(&inputs(100_000.0, 10.0, 2.0, 50_000.0, 80.0, (4.0, 4.0, 4.0)))
            .expect("floats compute");
        assert_eq!(a, b);
    }

    #[test]
    fn at_roi_calc_03_roi_is_net_benefit_over_budget_across_grid() {
        for budget in [1.0, 250.0, 9_999.5, 1_000_000.0, -5_000.0] {
            for impact in [0.0, 1.0, 37.0] {
                for previous in [0.0, 55.5, 100.0] {
                    for scores in [(1.0, 1.0, 1.0), (5.0, 3.0, 2.0), (5.0, 5.0, 5.0)] {
                        let out = compute_roi(&inputs(
                            budget, impact, 3.0, 42_000.0, previous, scores,
                        ))
                        .expect("non-zero budget must compute");
                        let readiness = (scores.0 + scores.1 + scores.2) / 15.0;
                        let expected_success = previous * readiness;
                        let net = impact * 42_000.0 * 3.0 * (expected_success / 100.0) - budget;
                        assert_eq!(out.net_benefit, net);
                        assert_eq!(out.roi, (net / budget) * 100.0);
                    }
                }
            }
        }
    }

    #[test]
    fn at_roi_calc_04_zero_budget_is_rejected() {
        let err = compute_roi(&inputs(0.0, 10.0, 2.0, 50_000.0, 80.0, (4.0, 4.0, 4.0)))
            .expect_err("zero budget must fail");
        assert_eq!(
            err,
            ContractViolation::DivisionByZero {
                field: "project_budget"
            }
        );
    }

    #[test]
    fn at_roi_calc_05_overflow_is_rejected_when_building_record() {
        let i = inputs(1.0, 1e300, 1e300, 1e300, 80.0, (4.0, 4.0, 4.0));
        let out = compute_roi(&i).expect("compute itself does not check finiteness");
        let err = out
            .into_record(&i, "2024-01-01 00:00:00.000000".to_string())
            .expect_err("infinite net benefit must fail");
        assert_eq!(
            err,
            ContractViolation::NotFinite {
                field: "net_benefit"
            }
        );
    }

    #[test]
    fn at_roi_calc_06_record_echoes_inputs() {
        let i = RoiInputs {
            project_budget: Number::from(100_000u64),
            project_duration: Number::from(2u64),
            ..inputs(100_000.0, 10.0, 2.0, 50_000.0, 80.0, (4.0, 4.0, 4.0))
        };
        let record = compute_roi(&i)
            .expect("compute")
            .into_record(&i, "ts".to_string())
            .expect("finite record");
        assert_eq!(record.project_budget, Number::from(100_000u64));
        assert_eq!(record.project_duration, Number::from(2u64));
        assert_eq!(record.industry_type, "Tech");
        assert_eq!(record.roi.as_f64(), Some(540.0));
        assert_eq!(record.timestamp, "ts");
    }
}
