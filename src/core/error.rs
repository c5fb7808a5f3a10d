use thiserror::Error;

/// Configuration problems that make a run meaningless. These abort.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: cannot parse '{value}' as a number for '{field}'")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("row {row}: '{field}' must be 0 or 1, got '{value}'")]
    InvalidFlag {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("step {order}: unknown optimization sense '{value}' (expected Max or Min)")]
    InvalidSense { order: i64, value: String },

    #[error("step {order}: '{value}' is not a numeric loan field or facility_cost")]
    InvalidTarget { order: i64, value: String },
}

/// Failures parsing or evaluating a coefficient expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unexpected token '{found}' (expected {expected})")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unknown loan field '{0}'")]
    UnknownField(String),

    #[error("loan {loan_id} has no value for '{field}'")]
    MissingValue { loan_id: String, field: String },

    #[error("text value used in arithmetic")]
    TextInArithmetic,

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Structural problems detected by the optimization engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("eligibility matrix is {rows}x{cols}, expected {loans}x{facilities}")]
    MatrixShape {
        rows: usize,
        cols: usize,
        loans: usize,
        facilities: usize,
    },

    #[error("facility {facility} pool covenant {covenant} has {len} coefficients for {loans} candidate loans")]
    CoefficientLength {
        facility: usize,
        covenant: usize,
        len: usize,
        loans: usize,
    },

    #[error("assignment ({loan}, {facility}) is out of range")]
    AssignmentOutOfRange { loan: usize, facility: usize },
}

/// Failures reading or writing tables.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{table} table, row {row}: {source}")]
    Row {
        table: &'static str,
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("{table} table: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{table} table is missing column '{column}'")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Anything that can stop a full allocation run.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
