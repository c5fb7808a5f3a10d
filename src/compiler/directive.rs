use crate::core::error::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One raw row of the facility/covenant configuration table.
///
/// Cells are kept as text until the compiler interprets them, because
/// whether a blank or malformed cell is fatal depends on the directive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRow {
    /// 1-based data row number, for error messages.
    pub row: usize,
    pub number: Option<String>,
    pub cost: Option<String>,
    pub capacity: Option<String>,
    pub command: Option<String>,
    pub constr_prop: Option<String>,
    pub constr_op: Option<String>,
    pub constr_val: Option<String>,
    pub crit_prop: Option<String>,
    pub crit_op: Option<String>,
    pub crit_val: Option<String>,
    pub a: Option<String>,
    pub b: Option<String>,
    pub c: Option<String>,
    pub constr_type: Option<String>,
    pub pool_op: Option<String>,
}

impl ConfigRow {
    /// A bare facility row with no directive.
    pub fn facility(number: u32, cost: &str, capacity: &str) -> Self {
        Self {
            number: Some(number.to_string()),
            cost: Some(cost.to_string()),
            capacity: Some(capacity.to_string()),
            ..Default::default()
        }
    }

    /// An `add_asset_covenants` row without critical gates.
    pub fn asset(number: u32, prop: &str, op: &str, value: &str) -> Self {
        Self {
            command: Some(Directive::ADD_ASSET.to_string()),
            constr_prop: Some(prop.to_string()),
            constr_op: Some(op.to_string()),
            constr_val: Some(value.to_string()),
            ..Self::facility(number, "0", "")
        }
    }

    /// An `add_pool_covenants` row.
    pub fn pool(number: u32, a: &str, b: &str, c: &str, constr_type: u8, op: u8) -> Self {
        Self {
            command: Some(Directive::ADD_POOL.to_string()),
            a: Some(a.to_string()),
            b: Some(b.to_string()),
            c: Some(c.to_string()),
            constr_type: Some(constr_type.to_string()),
            pool_op: Some(op.to_string()),
            ..Self::facility(number, "0", "")
        }
    }

    /// Add comma-separated critical gates to an asset row.
    pub fn with_gates(mut self, props: &str, ops: &str, values: &str) -> Self {
        self.crit_prop = Some(props.to_string());
        self.crit_op = Some(ops.to_string());
        self.crit_val = Some(values.to_string());
        self
    }

    pub fn with_cost(mut self, cost: &str) -> Self {
        self.cost = Some(cost.to_string());
        self
    }

    pub fn with_capacity(mut self, capacity: &str) -> Self {
        self.capacity = Some(capacity.to_string());
        self
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    pub fn directive(&self) -> Directive {
        match cell(&self.command) {
            Some(cmd) if cmd.contains(Directive::ADD_ASSET) => Directive::AddAssetCovenant,
            Some(cmd) if cmd.contains(Directive::ADD_POOL) => Directive::AddPoolCovenant,
            Some(cmd) => Directive::Unknown(cmd.to_string()),
            None => Directive::None,
        }
    }
}

/// What a configuration row asks the compiler to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    AddAssetCovenant,
    AddPoolCovenant,
    /// Facility-only row.
    None,
    Unknown(String),
}

impl Directive {
    pub const ADD_ASSET: &'static str = "add_asset_covenants";
    pub const ADD_POOL: &'static str = "add_pool_covenants";
}

/// Trimmed cell text with surrounding quotes removed; `None` when blank.
pub fn cell(raw: &Option<String>) -> Option<&str> {
    raw.as_deref()
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Comma-separated list cell; empty when blank.
pub fn list_cell(raw: &Option<String>) -> Vec<String> {
    match cell(raw) {
        Some(text) => text
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
            .collect(),
        None => Vec::new(),
    }
}

pub fn parse_f64(row: usize, field: &'static str, text: &str) -> Result<f64, ConfigError> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidNumber {
            row,
            field,
            value: text.to_string(),
        })
}

pub fn parse_decimal(row: usize, field: &'static str, text: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| ConfigError::InvalidNumber {
            row,
            field,
            value: text.to_string(),
        })
}

/// Facility numbers are whole and non-negative; `"3.0"` is accepted.
pub fn parse_facility_number(row: usize, text: &str) -> Result<u32, ConfigError> {
    let value = parse_f64(row, "Number", text)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(ConfigError::InvalidNumber {
            row,
            field: "Number",
            value: text.to_string(),
        });
    }
    Ok(value as u32)
}

/// A 0/1 flag cell; blank means 0.
pub fn parse_flag(row: usize, field: &'static str, raw: &Option<String>) -> Result<u8, ConfigError> {
    let Some(text) = cell(raw) else {
        return Ok(0);
    };
    let value = parse_f64(row, field, text)?;
    if value == 0.0 {
        Ok(0)
    } else if value == 1.0 {
        Ok(1)
    } else {
        Err(ConfigError::InvalidFlag {
            row,
            field,
            value: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cell_cleaning() {
        assert_eq!(cell(&Some("  \"oltv\" ".into())), Some("oltv"));
        assert_eq!(cell(&Some("'<='".into())), Some("<="));
        assert_eq!(cell(&Some("   ".into())), None);
        assert_eq!(cell(&None), None);
    }

    #[test]
    fn test_list_cell() {
        assert_eq!(list_cell(&Some("oltv, purpose".into())), vec!["oltv", "purpose"]);
        assert!(list_cell(&None).is_empty());
    }

    #[test]
    fn test_directive_detection() {
        assert_eq!(ConfigRow::asset(1, "state", "==", "CA").directive(), Directive::AddAssetCovenant);
        assert_eq!(ConfigRow::pool(1, "1", "1", "2", 1, 0).directive(), Directive::AddPoolCovenant);
        assert_eq!(ConfigRow::facility(1, "0", "0").directive(), Directive::None);
        let mut row = ConfigRow::facility(1, "0", "0");
        row.command = Some("drop_facility".into());
        assert_eq!(row.directive(), Directive::Unknown("drop_facility".into()));
    }

    #[test]
    fn test_numeric_parsing() {
        assert_eq!(parse_facility_number(1, "3.0").unwrap(), 3);
        assert!(parse_facility_number(1, "2.5").is_err());
        assert!(parse_facility_number(1, "-1").is_err());
        assert_eq!(parse_decimal(1, "Cost", "1500.25").unwrap(), dec!(1500.25));
        assert_eq!(parse_decimal(1, "Cost", "1e6").unwrap(), dec!(1000000));
        assert!(matches!(
            parse_decimal(2, "Cost", "cheap"),
            Err(ConfigError::InvalidNumber { row: 2, .. })
        ));
    }

    #[test]
    fn test_flags() {
        assert_eq!(parse_flag(1, "constr_type", &None).unwrap(), 0);
        assert_eq!(parse_flag(1, "constr_type", &Some("1.0".into())).unwrap(), 1);
        assert!(matches!(
            parse_flag(1, "constr_type", &Some("2".into())),
            Err(ConfigError::InvalidFlag { .. })
        ));
        assert!(matches!(
            parse_flag(1, "constr_type", &Some("x".into())),
            Err(ConfigError::InvalidNumber { .. })
        ));
    }
}
