use crate::core::error::ConfigError;
use crate::core::loan::LoanField;
use crate::optimization::model::Sense;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a step optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveTarget {
    /// Total cost of the facilities that receive at least one loan.
    FacilityCost,
    /// Sum of a numeric loan attribute over assigned loans.
    Loan(LoanField),
}

impl ObjectiveTarget {
    pub const FACILITY_COST: &'static str = "facility_cost";

    pub fn is_facility_cost(&self) -> bool {
        matches!(self, ObjectiveTarget::FacilityCost)
    }
}

impl FromStr for ObjectiveTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name == Self::FACILITY_COST {
            return Ok(ObjectiveTarget::FacilityCost);
        }
        let field = LoanField::from_str(name)?;
        if !field.is_numeric() {
            return Err(format!("'{}' is not a numeric loan attribute", name));
        }
        Ok(ObjectiveTarget::Loan(field))
    }
}

impl fmt::Display for ObjectiveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectiveTarget::FacilityCost => write!(f, "{}", Self::FACILITY_COST),
            ObjectiveTarget::Loan(field) => write!(f, "{}", field),
        }
    }
}

/// One entry of the optimization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStep {
    pub order: i64,
    pub sense: Sense,
    pub target: ObjectiveTarget,
}

impl OptimizationStep {
    pub fn new(order: i64, sense: Sense, target: ObjectiveTarget) -> Self {
        Self { order, sense, target }
    }

    pub fn maximize(order: i64, field: LoanField) -> Self {
        Self::new(order, Sense::Max, ObjectiveTarget::Loan(field))
    }

    pub fn minimize(order: i64, field: LoanField) -> Self {
        Self::new(order, Sense::Min, ObjectiveTarget::Loan(field))
    }

    pub fn minimize_cost(order: i64) -> Self {
        Self::new(order, Sense::Min, ObjectiveTarget::FacilityCost)
    }

    /// Interpret the `Type` and `Input` cells of an order-table row.
    pub fn parse(order: i64, sense: &str, target: &str) -> Result<Self, ConfigError> {
        let sense = Sense::parse(sense).ok_or_else(|| ConfigError::InvalidSense {
            order,
            value: sense.to_string(),
        })?;
        let target = target
            .parse::<ObjectiveTarget>()
            .map_err(|_| ConfigError::InvalidTarget {
                order,
                value: target.to_string(),
            })?;
        Ok(Self::new(order, sense, target))
    }
}

impl fmt::Display for OptimizationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {} {}", self.order, self.sense, self.target)
    }
}

/// Steps in execution order. Ties keep their input order.
pub fn sort_steps(steps: &[OptimizationStep]) -> Vec<OptimizationStep> {
    let mut sorted = steps.to_vec();
    sorted.sort_by_key(|s| s.order);
    sorted
}
