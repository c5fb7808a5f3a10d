use crate::compiler::directive::{
    cell, list_cell, parse_decimal, parse_f64, parse_facility_number, parse_flag, ConfigRow,
    Directive,
};
use crate::compiler::expression::Expr;
use crate::core::covenant::{AssetCovenant, Bound, Condition, PoolCovenant, PoolKind};
use crate::core::error::{ConfigError, ExpressionError};
use crate::core::facility::{Facility, FacilityId, FacilitySet};
use crate::core::ledger::HistoricalLedger;
use crate::core::loan::{Loan, LoanField};
use crate::core::value::{AttrValue, Operator};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Why a configuration row produced no covenant.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum SkipReason {
    #[error("missing '{0}'")]
    MissingField(&'static str),

    #[error("unknown loan field '{0}'")]
    UnknownField(String),

    #[error("critical lists have {props} fields, {ops} operators and {values} values")]
    CriticalListMismatch {
        props: usize,
        ops: usize,
        values: usize,
    },

    #[error("expression '{column}' failed: {error}")]
    Expression {
        column: &'static str,
        #[serde(skip)]
        error: ExpressionError,
    },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// A recovered per-row problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub facility: FacilityId,
    pub reason: SkipReason,
}

/// What a compilation produced besides the facilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompileSummary {
    pub asset_covenants: usize,
    pub pool_covenants: usize,
    pub skipped: Vec<SkippedRow>,
}

/// Facilities with their covenants attached, plus the summary.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub facilities: FacilitySet,
    pub summary: CompileSummary,
}

/// Turns configuration rows into facilities and typed covenants.
///
/// Pool-covenant coefficient expressions are evaluated once against the
/// reference population (the candidate loans, in candidate order) and once
/// against each facility's slice of the historical ledger.
pub struct CovenantCompiler<'a> {
    ledger: &'a HistoricalLedger,
    reference: &'a [Loan],
}

impl<'a> CovenantCompiler<'a> {
    pub fn new(ledger: &'a HistoricalLedger, reference: &'a [Loan]) -> Self {
        Self { ledger, reference }
    }

    /// Compile every row in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required number cannot be parsed or a
    /// row has no facility number. Every other problem skips the row and is
    /// recorded in the summary.
    pub fn compile(&self, rows: &[ConfigRow]) -> Result<Compilation, ConfigError> {
        let mut facilities = FacilitySet::new();
        let mut summary = CompileSummary::default();

        for (position, raw) in rows.iter().enumerate() {
            let row = if raw.row == 0 { position + 1 } else { raw.row };
            let index = self.resolve_facility(&mut facilities, raw, row)?;
            let facility_id = facilities.get(index).map(Facility::id).unwrap_or_default();

            let outcome = match raw.directive() {
                Directive::AddAssetCovenant => self.asset_covenant(raw).map(|c| {
                    if let Some(facility) = facilities.get_mut(index) {
                        facility.add_asset_covenant(c);
                    }
                    summary.asset_covenants += 1;
                }),
                Directive::AddPoolCovenant => self.pool_covenant(raw, row, facility_id)?.map(|c| {
                    if let Some(facility) = facilities.get_mut(index) {
                        facility.add_pool_covenant(c);
                    }
                    summary.pool_covenants += 1;
                }),
                Directive::None => Ok(()),
                Directive::Unknown(cmd) => Err(SkipReason::UnknownCommand(cmd)),
            };

            if let Err(reason) = outcome {
                warn!("config row {} (facility {}): skipped, {}", row, facility_id, reason);
                summary.skipped.push(SkippedRow {
                    row,
                    facility: facility_id,
                    reason,
                });
            }
        }

        info!(
            "compiled {} facilities: {} asset covenants, {} pool covenants, {} rows skipped",
            facilities.len(),
            summary.asset_covenants,
            summary.pool_covenants,
            summary.skipped.len()
        );
        Ok(Compilation {
            facilities,
            summary,
        })
    }

    fn resolve_facility(
        &self,
        facilities: &mut FacilitySet,
        raw: &ConfigRow,
        row: usize,
    ) -> Result<usize, ConfigError> {
        let number = cell(&raw.number).ok_or(ConfigError::MissingField {
            row,
            field: "Number",
        })?;
        let id = FacilityId::new(parse_facility_number(row, number)?);
        let cost = cell(&raw.cost)
            .map(|text| parse_decimal(row, "Cost", text))
            .transpose()?;
        let capacity = cell(&raw.capacity)
            .map(|text| parse_decimal(row, "facility_space", text))
            .transpose()?
            .unwrap_or(Decimal::ZERO);

        match facilities.index_of(id) {
            Some(index) => {
                if let Some(facility) = facilities.get_mut(index) {
                    facility.widen_capacity(capacity);
                }
                Ok(index)
            }
            None => {
                debug!("facility {} created from row {}", id, row);
                Ok(facilities.push(Facility::new(
                    id,
                    cost.unwrap_or(Decimal::ZERO),
                    capacity,
                )))
            }
        }
    }

    fn asset_covenant(&self, raw: &ConfigRow) -> Result<AssetCovenant, SkipReason> {
        let prop = cell(&raw.constr_prop).ok_or(SkipReason::MissingField("constr_prop"))?;
        let op = cell(&raw.constr_op).ok_or(SkipReason::MissingField("constr_op"))?;
        let value = cell(&raw.constr_val).ok_or(SkipReason::MissingField("constr_val"))?;
        let primary = Condition::new(resolve(prop)?, Operator::parse(op), AttrValue::parse_literal(value));

        let props = list_cell(&raw.crit_prop);
        let ops = list_cell(&raw.crit_op);
        let values = list_cell(&raw.crit_val);
        if props.len() != ops.len() || ops.len() != values.len() {
            return Err(SkipReason::CriticalListMismatch {
                props: props.len(),
                ops: ops.len(),
                values: values.len(),
            });
        }

        let gates = props
            .iter()
            .zip(&ops)
            .zip(&values)
            .map(|((prop, op), value)| {
                Ok(Condition::new(
                    resolve(prop)?,
                    Operator::parse(op),
                    AttrValue::parse_literal(value),
                ))
            })
            .collect::<Result<Vec<_>, SkipReason>>()?;

        Ok(AssetCovenant::new(primary).with_gates(gates))
    }

    /// Outer error is fatal; inner error skips the row.
    fn pool_covenant(
        &self,
        raw: &ConfigRow,
        row: usize,
        facility_id: FacilityId,
    ) -> Result<Result<PoolCovenant, SkipReason>, ConfigError> {
        let (Some(a_src), Some(b_src), Some(c_src)) = (cell(&raw.a), cell(&raw.b), cell(&raw.c)) else {
            let missing = if cell(&raw.a).is_none() {
                "a"
            } else if cell(&raw.b).is_none() {
                "b"
            } else {
                "c"
            };
            return Ok(Err(SkipReason::MissingField(missing)));
        };

        let c = parse_f64(row, "c", c_src)?;
        let kind_flag = parse_flag(row, "constr_type", &raw.constr_type)?;
        let bound_flag = parse_flag(row, "constr_op", &raw.pool_op)?;
        let kind = PoolKind::from_flag(kind_flag).unwrap_or(PoolKind::Ratio);
        let bound = Bound::from_flag(bound_flag).unwrap_or(Bound::AtMost);

        Ok(self.coefficients(a_src, b_src, facility_id).map(|(a, b, a_e, b_e)| {
            debug!(
                "facility {}: pool covenant {:?}/{:?} c={} over {} candidates, {} ledger loans",
                facility_id,
                kind,
                bound,
                c,
                a.len(),
                a_e.len()
            );
            PoolCovenant::new(a, b, c, kind, bound).with_existing(a_e, b_e)
        }))
    }

    #[allow(clippy::type_complexity)]
    fn coefficients(
        &self,
        a_src: &str,
        b_src: &str,
        facility_id: FacilityId,
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>), SkipReason> {
        let a_expr = Expr::parse(a_src).map_err(|error| SkipReason::Expression { column: "a", error })?;
        let b_expr = Expr::parse(b_src).map_err(|error| SkipReason::Expression { column: "b", error })?;

        let a = a_expr
            .evaluate_column(self.reference)
            .map_err(|error| SkipReason::Expression { column: "a", error })?;
        let b = b_expr
            .evaluate_column(self.reference)
            .map_err(|error| SkipReason::Expression { column: "b", error })?;

        let existing = self.ledger.loans_for(facility_id);
        if existing.is_empty() {
            return Ok((a, b, Vec::new(), Vec::new()));
        }
        let a_e = a_expr
            .evaluate_column(existing.iter().copied())
            .map_err(|error| SkipReason::Expression { column: "a", error })?;
        let b_e = b_expr
            .evaluate_column(existing.iter().copied())
            .map_err(|error| SkipReason::Expression { column: "b", error })?;
        Ok((a, b, a_e, b_e))
    }
}

fn resolve(name: &str) -> Result<LoanField, SkipReason> {
    name.parse::<LoanField>()
        .map_err(|_| SkipReason::UnknownField(name.to_string()))
}
