use crate::error::{FlashReportError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[schemars(description = "US dollars; amounts come from the *_USD columns")]
    Usd,
    #[schemars(description = "Local currency; amounts come from the *_LC columns")]
    Lc,
}

impl Currency {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Lc => "LC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// "DS"
    DirectSale,
    /// "Orders"
    Orders,
    /// "S4DOR"
    PipelineOrders,
    Other(String),
}

impl DataType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "DS" => Self::DirectSale,
            "Orders" => Self::Orders,
            "S4DOR" => Self::PipelineOrders,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_order(&self) -> bool {
        matches!(self, Self::Orders | Self::PipelineOrders)
    }
}

/// Fiscal month as carried by the extract (`YYYYMM`, calendar month numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiscalMonth {
    pub year: i32,
    pub month: u32,
}

impl FiscalMonth {
    pub fn from_yyyymm(value: i64) -> Result<Self> {
        let year = value / 100;
        let month = value % 100;
        if !(1900..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(FlashReportError::InvalidFiscalMonth(value.to_string()));
        }
        Ok(Self {
            year: year as i32,
            month: month as u32,
        })
    }

    pub fn first_day(&self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(|| {
            FlashReportError::DateError(format!("invalid month {}-{}", self.year, self.month))
        })
    }

    /// English month name, e.g. "August".
    pub fn month_name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "January",
            "February",
            "March",
            "April",
            "May",
            "June",
            "July",
            "August",
            "September",
            "October",
            "November",
            "December",
        ];
        NAMES[(self.month.clamp(1, 12) - 1) as usize]
    }
}

impl fmt::Display for FiscalMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Monetary columns for one currency. `None` is a missing or non-numeric cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Amounts {
    pub list_price: Option<f64>,
    pub net: Option<f64>,
    pub upfront: Option<f64>,
    pub backend: Option<f64>,
}

/// One sales line from the transaction extract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub source_system: Option<i64>,
    pub cross_sourced: Option<String>,
    pub bde_flag: Option<String>,
    pub msp_flag: Option<String>,
    pub reporting_type: Option<String>,
    pub product_line: Option<String>,
    pub reseller_id: Option<String>,
    pub distributor_id: Option<String>,
    pub fiscal_month: Option<FiscalMonth>,
    pub usd: Amounts,
    pub local: Amounts,
    pub data_type: Option<DataType>,
    pub backend_deal: Option<String>,
    pub invoice_number: Option<String>,
    pub sales_order_number: Option<String>,
    pub distributor_name: Option<String>,
    pub reseller_name: Option<String>,
    pub product_number: Option<String>,
    pub portfolio_mapping_1: Option<String>,
    pub portfolio_mapping_2: Option<String>,
}

impl TransactionRecord {
    pub fn amounts(&self, currency: Currency) -> &Amounts {
        match currency {
            Currency::Usd => &self.usd,
            Currency::Lc => &self.local,
        }
    }

    pub fn product_line(&self) -> &str {
        self.product_line.as_deref().unwrap_or("")
    }
}

/// One row of a region's eligibility reference table. Each column is an
/// independent list; a row rarely fills all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub product_line: Option<String>,
    pub business_unit: Option<String>,
    pub program_type: Option<String>,
    pub exclusion_party_id: Option<String>,
    pub exclusion_level: Option<String>,
    pub pg_eligible_party_id: Option<String>,
    pub location_id: Option<String>,
    pub eligible_deal: Option<String>,
    pub standalone_product_line: Option<String>,
    pub standalone_tag: Option<String>,
    pub common_product_line: Option<String>,
    pub common_tag: Option<String>,
}

/// Lookup tables built from a region's reference rows. Duplicate keys take the
/// first non-missing value of each attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRules {
    pub business_units: BTreeMap<String, String>,
    pub program_types: BTreeMap<String, String>,
    pub exclusion_levels: BTreeMap<String, String>,
    pub pg_eligible: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub eligible_deals: BTreeSet<String>,
    pub standalone_tags: BTreeMap<String, String>,
    pub common_tags: BTreeMap<String, String>,
}

fn first_value(map: &mut BTreeMap<String, String>, key: &Option<String>, value: &Option<String>) {
    if let (Some(key), Some(value)) = (key, value) {
        map.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

impl ReferenceRules {
    /// `no_exclusion_markers` are exclusion-level values treated as missing.
    pub fn from_rows(rows: &[ReferenceRow], no_exclusion_markers: &[String]) -> Self {
        let mut rules = Self::default();

        for row in rows {
            first_value(&mut rules.business_units, &row.product_line, &row.business_unit);
            first_value(&mut rules.program_types, &row.product_line, &row.program_type);

            let level = row
                .exclusion_level
                .clone()
                .filter(|l| !no_exclusion_markers.iter().any(|m| m == l));
            first_value(&mut rules.exclusion_levels, &row.exclusion_party_id, &level);

            rules.pg_eligible.extend(row.pg_eligible_party_id.clone());
            rules.locations.extend(row.location_id.clone());
            rules.eligible_deals.extend(row.eligible_deal.clone());

            first_value(
                &mut rules.standalone_tags,
                &row.standalone_product_line,
                &row.standalone_tag,
            );
            first_value(&mut rules.common_tags, &row.common_product_line, &row.common_tag);
        }

        rules
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Coverage {
    #[serde(rename = "PG")]
    #[schemars(description = "Reseller is on the partner-group eligibility list")]
    Pg,
    #[serde(rename = "SBP")]
    #[schemars(description = "Any other reseller")]
    Sbp,
}

impl Coverage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pg => "PG",
            Self::Sbp => "SBP",
        }
    }

    pub fn all() -> [Coverage; 2] {
        [Coverage::Pg, Coverage::Sbp]
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductFamily {
    ComputeStorage,
    Services,
}

/// Row-wise reconciliation of list price, discounts and net.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub delta: Option<f64>,
    pub updated_upfront: Option<f64>,
    pub diff: Option<f64>,
    pub match_amount: Option<f64>,
    pub match_residual: Option<f64>,
}

/// A transaction annotated against one region's reference rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub record: Rc<TransactionRecord>,
    pub business_unit: Option<String>,
    pub program_type: Option<String>,
    /// Business unit + type, possibly reclassified; empty when unmapped.
    pub scheme: String,
    pub family: Option<ProductFamily>,
    pub exclusion_level: Option<String>,
    pub coverage: Coverage,
    /// Distributor id when the distributor is an eligible location.
    pub partner: Option<String>,
    pub deal_excluded: bool,
    pub standalone_tag: Option<String>,
    pub common_tag: Option<String>,
    pub reconciliation: Reconciliation,
}

impl ClassifiedRecord {
    pub fn product_line(&self) -> &str {
        self.record.product_line()
    }

    pub fn is_excluded(&self) -> bool {
        self.exclusion_level.is_some()
    }

    pub fn net(&self, currency: Currency) -> Option<f64> {
        self.record.amounts(currency).net
    }
}
