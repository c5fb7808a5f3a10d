//! CSV tables: candidate loans, facility configuration, optimization
//! order and the historical ledger.
//!
//! Readers take any [`Read`]; the `load_*`/`save_*` helpers open files.
//! Row numbers in errors are 1-based and exclude the header.

use crate::compiler::directive::{parse_f64, ConfigRow};
use crate::core::error::{ConfigError, LoadError};
use crate::core::facility::FacilityId;
use crate::core::ledger::{HistoricalLedger, LedgerEntry};
use crate::core::loan::{Loan, LoanField};
use crate::optimization::step::OptimizationStep;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const LOANS: &str = "loans";
const CONFIG: &str = "configuration";
const ORDER: &str = "order";
const LEDGER: &str = "ledger";

pub const FACILITY_ID_COLUMN: &str = "facility_id";

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

fn headers<R: Read>(rdr: &mut csv::Reader<R>, table: &'static str) -> Result<csv::StringRecord, LoadError> {
    rdr.headers()
        .cloned()
        .map_err(|source| LoadError::Csv { table, source })
}

pub fn read_loans<R: Read>(source: R) -> Result<Vec<Loan>, LoadError> {
    let mut rdr = reader(source);
    let loans: Result<Vec<Loan>, LoadError> = rdr
        .deserialize::<Loan>()
        .enumerate()
        .map(|(i, record)| {
            record.map_err(|source| LoadError::Row {
                table: LOANS,
                row: i + 1,
                source,
            })
        })
        .collect();
    loans
}

pub fn write_loans<W: Write>(sink: W, loans: &[Loan]) -> Result<(), LoadError> {
    let mut wtr = csv::Writer::from_writer(sink);
    let csv_err = |source| LoadError::Csv { table: LOANS, source };
    wtr.write_record(LoanField::ALL.iter().map(LoanField::column))
        .map_err(csv_err)?;
    for loan in loans {
        wtr.write_record(loan.to_cells()).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the configuration table by header name.
///
/// The pool direction may appear as a second `constr_op` column or as
/// `constr_op.1`. Missing optional columns read as blank cells.
pub fn read_config<R: Read>(source: R) -> Result<Vec<ConfigRow>, LoadError> {
    let mut rdr = reader(source);
    let header = headers(&mut rdr, CONFIG)?;

    let mut columns: HashMap<&str, usize> = HashMap::new();
    let mut pool_op = None;
    for (idx, name) in header.iter().enumerate() {
        if name == "constr_op" && columns.contains_key("constr_op") {
            if pool_op.is_none() {
                pool_op = Some(idx);
            }
        } else if name == "constr_op.1" {
            pool_op = Some(idx);
        } else {
            columns.entry(name).or_insert(idx);
        }
    }
    if !columns.contains_key("Number") {
        return Err(LoadError::MissingColumn {
            table: CONFIG,
            column: "Number",
        });
    }
    let capacity_col = columns
        .get("facility_space")
        .or_else(|| columns.get("Capacity"))
        .copied();

    let mut rows = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| LoadError::Row {
            table: CONFIG,
            row: i + 1,
            source,
        })?;
        let at = |idx: Option<usize>| {
            idx.and_then(|k| record.get(k))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let named = |name: &str| at(columns.get(name).copied());
        rows.push(ConfigRow {
            row: i + 1,
            number: named("Number"),
            cost: named("Cost"),
            capacity: at(capacity_col),
            command: named("Command"),
            constr_prop: named("constr_prop"),
            constr_op: named("constr_op"),
            constr_val: named("constr_val"),
            crit_prop: named("crit_prop"),
            crit_op: named("crit_op"),
            crit_val: named("crit_val"),
            a: named("a"),
            b: named("b"),
            c: named("c"),
            constr_type: named("constr_type"),
            pool_op: at(pool_op),
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct OrderRecord {
    #[serde(rename = "Order")]
    order: i64,
    #[serde(rename = "Type")]
    sense: String,
    #[serde(rename = "Input")]
    input: String,
}

/// Read the optimization order. Rows keep file order; sorting by `Order`
/// happens in the engine.
pub fn read_order<R: Read>(source: R) -> Result<Vec<OptimizationStep>, LoadError> {
    let mut rdr = reader(source);
    let mut steps = Vec::new();
    for (i, record) in rdr.deserialize::<OrderRecord>().enumerate() {
        let record = record.map_err(|source| LoadError::Row {
            table: ORDER,
            row: i + 1,
            source,
        })?;
        steps.push(OptimizationStep::parse(record.order, &record.sense, &record.input)?);
    }
    Ok(steps)
}

fn parse_facility_id(row: usize, text: &str) -> Result<FacilityId, ConfigError> {
    let value = parse_f64(row, FACILITY_ID_COLUMN, text)?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(ConfigError::InvalidNumber {
            row,
            field: FACILITY_ID_COLUMN,
            value: text.to_string(),
        });
    }
    Ok(FacilityId::new(value as u32))
}

/// Read a ledger table: a `facility_id` column plus the loan columns.
pub fn read_ledger<R: Read>(source: R) -> Result<HistoricalLedger, LoadError> {
    let mut rdr = reader(source);
    let header = headers(&mut rdr, LEDGER)?;
    let id_col = header
        .iter()
        .position(|h| h == FACILITY_ID_COLUMN)
        .ok_or(LoadError::MissingColumn {
            table: LEDGER,
            column: FACILITY_ID_COLUMN,
        })?;
    let loan_header = without(&header, id_col);

    let mut entries = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let row = i + 1;
        let record = record.map_err(|source| LoadError::Row {
            table: LEDGER,
            row,
            source,
        })?;
        let facility_id = parse_facility_id(row, record.get(id_col).unwrap_or_default())?;
        let loan: Loan = without(&record, id_col)
            .deserialize(Some(&loan_header))
            .map_err(|source| LoadError::Row {
                table: LEDGER,
                row,
                source,
            })?;
        entries.push(LedgerEntry { facility_id, loan });
    }
    Ok(entries.into_iter().collect())
}

fn without(record: &csv::StringRecord, skip: usize) -> csv::StringRecord {
    record
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != skip)
        .map(|(_, cell)| cell)
        .collect()
}

/// Write a ledger in the schema [`read_ledger`] accepts.
pub fn write_ledger<W: Write>(sink: W, ledger: &HistoricalLedger) -> Result<(), LoadError> {
    let mut wtr = csv::Writer::from_writer(sink);
    let csv_err = |source| LoadError::Csv { table: LEDGER, source };
    let header = std::iter::once(FACILITY_ID_COLUMN).chain(LoanField::ALL.iter().map(LoanField::column));
    wtr.write_record(header).map_err(csv_err)?;
    for entry in ledger.entries() {
        let cells = std::iter::once(entry.facility_id.to_string()).chain(entry.loan.to_cells());
        wtr.write_record(cells).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn load_loans(path: impl AsRef<Path>) -> Result<Vec<Loan>, LoadError> {
    read_loans(File::open(path)?)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Vec<ConfigRow>, LoadError> {
    read_config(File::open(path)?)
}

pub fn load_order(path: impl AsRef<Path>) -> Result<Vec<OptimizationStep>, LoadError> {
    read_order(File::open(path)?)
}

/// A missing ledger file is an empty ledger.
pub fn load_ledger(path: impl AsRef<Path>) -> Result<HistoricalLedger, LoadError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("no ledger at {}; starting empty", path.display());
        return Ok(HistoricalLedger::new());
    }
    read_ledger(File::open(path)?)
}

pub fn save_ledger(path: impl AsRef<Path>, ledger: &HistoricalLedger) -> Result<(), LoadError> {
    write_ledger(File::create(path)?, ledger)
}

pub fn save_loans(path: impl AsRef<Path>, loans: &[Loan]) -> Result<(), LoadError> {
    write_loans(File::create(path)?, loans)
}
