use crate::core::value::AttrValue;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every column of the loan schema, addressable by its table header name.
///
/// Covenants, coefficient expressions and optimization targets all refer to
/// loan attributes by these names, so resolving them once into a
/// `LoanField` keeps the lookups typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanField {
    LoanId,
    Channel,
    Seller,
    Rate,
    Amount,
    Term,
    OrigDate,
    FirstPay,
    Ltv,
    Cltv,
    Borrowers,
    Dti,
    CreditScore,
    CoCreditScore,
    FirstTimeBuyer,
    Purpose,
    PropertyType,
    Units,
    Occupancy,
    State,
    Zip3,
    MiPct,
    ProductType,
    MiType,
    Relocation,
}

impl LoanField {
    /// Column order of the loan table.
    pub const ALL: [LoanField; 25] = [
        LoanField::LoanId,
        LoanField::Channel,
        LoanField::Seller,
        LoanField::Rate,
        LoanField::Amount,
        LoanField::Term,
        LoanField::OrigDate,
        LoanField::FirstPay,
        LoanField::Ltv,
        LoanField::Cltv,
        LoanField::Borrowers,
        LoanField::Dti,
        LoanField::CreditScore,
        LoanField::CoCreditScore,
        LoanField::FirstTimeBuyer,
        LoanField::Purpose,
        LoanField::PropertyType,
        LoanField::Units,
        LoanField::Occupancy,
        LoanField::State,
        LoanField::Zip3,
        LoanField::MiPct,
        LoanField::ProductType,
        LoanField::MiType,
        LoanField::Relocation,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            LoanField::LoanId => "LOAN_ID",
            LoanField::Channel => "ORIG_CHN",
            LoanField::Seller => "SELLER",
            LoanField::Rate => "orig_rt",
            LoanField::Amount => "orig_amt",
            LoanField::Term => "orig_trm",
            LoanField::OrigDate => "orig_date",
            LoanField::FirstPay => "first_pay",
            LoanField::Ltv => "oltv",
            LoanField::Cltv => "ocltv",
            LoanField::Borrowers => "num_bo",
            LoanField::Dti => "dti",
            LoanField::CreditScore => "CSCORE_B",
            LoanField::CoCreditScore => "CSCORE_C",
            LoanField::FirstTimeBuyer => "FTHB_FLG",
            LoanField::Purpose => "purpose",
            LoanField::PropertyType => "PROP_TYP",
            LoanField::Units => "NUM_UNIT",
            LoanField::Occupancy => "occ_stat",
            LoanField::State => "state",
            LoanField::Zip3 => "zip_3",
            LoanField::MiPct => "mi_pct",
            LoanField::ProductType => "prod_type",
            LoanField::MiType => "MI_TYPE",
            LoanField::Relocation => "relo_flg",
        }
    }

    /// Whether the field holds a numeric measure usable as an objective.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LoanField::Rate
                | LoanField::Amount
                | LoanField::Term
                | LoanField::Ltv
                | LoanField::Cltv
                | LoanField::Borrowers
                | LoanField::Dti
                | LoanField::CreditScore
                | LoanField::CoCreditScore
                | LoanField::Units
                | LoanField::MiPct
        )
    }
}

impl FromStr for LoanField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        LoanField::ALL
            .iter()
            .copied()
            .find(|f| f.column() == name)
            .ok_or_else(|| format!("unknown loan field '{}'", name))
    }
}

impl fmt::Display for LoanField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// A single loan asset offered for allocation.
///
/// Loans are read once from the loan table (or the historical ledger) and
/// never change afterwards. Attribute access by name goes through
/// [`Loan::get`].
///
/// # Examples
///
/// ```
/// use facility_allocator::core::loan::{Loan, LoanField};
/// use facility_allocator::core::value::AttrValue;
/// use rust_decimal_macros::dec;
///
/// let loan = Loan::new("L-1", dec!(250_000))
///     .with_state("CA")
///     .with_credit_score(742.0);
///
/// assert_eq!(loan.get(LoanField::State), AttrValue::Text("CA".into()));
/// assert_eq!(loan.numeric(LoanField::Amount), Some(250_000.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    #[serde(rename = "LOAN_ID")]
    loan_id: String,
    #[serde(rename = "ORIG_CHN", default)]
    channel: String,
    #[serde(rename = "SELLER", default)]
    seller: String,
    orig_rt: f64,
    orig_amt: Decimal,
    orig_trm: f64,
    #[serde(default)]
    orig_date: String,
    #[serde(default)]
    first_pay: String,
    oltv: f64,
    #[serde(default)]
    ocltv: Option<f64>,
    #[serde(default)]
    num_bo: Option<f64>,
    #[serde(default)]
    dti: Option<f64>,
    #[serde(rename = "CSCORE_B", default)]
    cscore_b: Option<f64>,
    #[serde(rename = "CSCORE_C", default)]
    cscore_c: Option<f64>,
    #[serde(rename = "FTHB_FLG", default)]
    fthb_flg: String,
    #[serde(default)]
    purpose: String,
    #[serde(rename = "PROP_TYP", default)]
    prop_typ: String,
    #[serde(rename = "NUM_UNIT", default)]
    num_unit: Option<f64>,
    #[serde(default)]
    occ_stat: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    zip_3: String,
    #[serde(default)]
    mi_pct: Option<f64>,
    #[serde(default)]
    prod_type: String,
    #[serde(rename = "MI_TYPE", default)]
    mi_type: Option<String>,
    #[serde(default)]
    relo_flg: String,
}

impl Loan {
    /// Create a loan with the given id and original principal.
    ///
    /// Remaining fields take the values of a plain 30-year fixed purchase
    /// loan and can be overridden with the `with_*` builders.
    pub fn new(loan_id: impl Into<String>, orig_amt: Decimal) -> Self {
        Self {
            loan_id: loan_id.into(),
            channel: "R".to_string(),
            seller: String::new(),
            orig_rt: 6.5,
            orig_amt,
            orig_trm: 360.0,
            orig_date: String::new(),
            first_pay: String::new(),
            oltv: 80.0,
            ocltv: Some(80.0),
            num_bo: Some(1.0),
            dti: None,
            cscore_b: None,
            cscore_c: None,
            fthb_flg: "N".to_string(),
            purpose: "P".to_string(),
            prop_typ: "SF".to_string(),
            num_unit: Some(1.0),
            occ_stat: "P".to_string(),
            state: String::new(),
            zip_3: String::new(),
            mi_pct: None,
            prod_type: "FRM".to_string(),
            mi_type: None,
            relo_flg: "N".to_string(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_seller(mut self, seller: impl Into<String>) -> Self {
        self.seller = seller.into();
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.orig_rt = rate;
        self
    }

    pub fn with_term(mut self, months: f64) -> Self {
        self.orig_trm = months;
        self
    }

    pub fn with_dates(mut self, orig_date: impl Into<String>, first_pay: impl Into<String>) -> Self {
        self.orig_date = orig_date.into();
        self.first_pay = first_pay.into();
        self
    }

    /// Set both original LTV and combined LTV.
    pub fn with_ltv(mut self, ltv: f64) -> Self {
        self.oltv = ltv;
        self.ocltv = Some(ltv);
        self
    }

    pub fn with_cltv(mut self, cltv: f64) -> Self {
        self.ocltv = Some(cltv);
        self
    }

    pub fn with_dti(mut self, dti: f64) -> Self {
        self.dti = Some(dti);
        self
    }

    pub fn with_credit_score(mut self, score: f64) -> Self {
        self.cscore_b = Some(score);
        self
    }

    pub fn with_co_credit_score(mut self, score: f64) -> Self {
        self.cscore_c = Some(score);
        self.num_bo = Some(2.0);
        self
    }

    pub fn with_first_time_buyer(mut self, flag: bool) -> Self {
        self.fthb_flg = if flag { "Y" } else { "N" }.to_string();
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn with_property(mut self, prop_typ: impl Into<String>, units: f64) -> Self {
        self.prop_typ = prop_typ.into();
        self.num_unit = Some(units);
        self
    }

    pub fn with_occupancy(mut self, occ_stat: impl Into<String>) -> Self {
        self.occ_stat = occ_stat.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_zip3(mut self, zip_3: impl Into<String>) -> Self {
        self.zip_3 = zip_3.into();
        self
    }

    pub fn with_mortgage_insurance(mut self, pct: f64, mi_type: impl Into<String>) -> Self {
        self.mi_pct = Some(pct);
        self.mi_type = Some(mi_type.into());
        self
    }

    pub fn with_product(mut self, prod_type: impl Into<String>) -> Self {
        self.prod_type = prod_type.into();
        self
    }

    // --- Accessors ---

    pub fn loan_id(&self) -> &str {
        &self.loan_id
    }

    pub fn orig_amt(&self) -> Decimal {
        self.orig_amt
    }

    pub fn rate(&self) -> f64 {
        self.orig_rt
    }

    pub fn ltv(&self) -> f64 {
        self.oltv
    }

    pub fn credit_score(&self) -> Option<f64> {
        self.cscore_b
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// Look up an attribute by field.
    pub fn get(&self, field: LoanField) -> AttrValue {
        fn text(s: &str) -> AttrValue {
            if s.is_empty() {
                AttrValue::Missing
            } else {
                AttrValue::Text(s.to_string())
            }
        }

        match field {
            LoanField::LoanId => text(&self.loan_id),
            LoanField::Channel => text(&self.channel),
            LoanField::Seller => text(&self.seller),
            LoanField::Rate => AttrValue::Number(self.orig_rt),
            LoanField::Amount => self.orig_amt.to_f64().into(),
            LoanField::Term => AttrValue::Number(self.orig_trm),
            LoanField::OrigDate => text(&self.orig_date),
            LoanField::FirstPay => text(&self.first_pay),
            LoanField::Ltv => AttrValue::Number(self.oltv),
            LoanField::Cltv => self.ocltv.into(),
            LoanField::Borrowers => self.num_bo.into(),
            LoanField::Dti => self.dti.into(),
            LoanField::CreditScore => self.cscore_b.into(),
            LoanField::CoCreditScore => self.cscore_c.into(),
            LoanField::FirstTimeBuyer => text(&self.fthb_flg),
            LoanField::Purpose => text(&self.purpose),
            LoanField::PropertyType => text(&self.prop_typ),
            LoanField::Units => self.num_unit.into(),
            LoanField::Occupancy => text(&self.occ_stat),
            LoanField::State => text(&self.state),
            LoanField::Zip3 => text(&self.zip_3),
            LoanField::MiPct => self.mi_pct.into(),
            LoanField::ProductType => text(&self.prod_type),
            LoanField::MiType => self.mi_type.as_deref().map_or(AttrValue::Missing, text),
            LoanField::Relocation => text(&self.relo_flg),
        }
    }

    /// Numeric view of an attribute, `None` when missing or not a number.
    pub fn numeric(&self, field: LoanField) -> Option<f64> {
        match field {
            LoanField::Amount => self.orig_amt.to_f64(),
            _ => self.get(field).as_number(),
        }
    }

    /// The record as table cells, in [`LoanField::ALL`] order.
    pub fn to_cells(&self) -> Vec<String> {
        LoanField::ALL
            .iter()
            .map(|field| match field {
                LoanField::Amount => self.orig_amt.to_string(),
                other => self.get(*other).to_string(),
            })
            .collect()
    }
}
