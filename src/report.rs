//! Report structs and their sheet layouts.

use crate::aggregate::{ProgramSummaryRow, SchemeReport, SchemeTotals};
use crate::calendar::FiscalQuarter;
use crate::error::Result;
use crate::rebate::AllocationRow;
use crate::schema::{ClassifiedRecord, Currency};
use crate::table::{CellValue, Sheet, Table};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod sheets {
    pub const PROGRAM_SUMMARY: &str = "Program Summary";
    pub const DSO_DATASHEET: &str = "DSO DataSheet";
    pub const SUMMARY: &str = "Summary";
    pub const SUMMARY2: &str = "Summary2";
    pub const EXCLUSIONS_DATA: &str = "Exclusions Data";
    pub const ATTACH: &str = "Attach";
    pub const ANNUITY: &str = "Annuity";
}

/// Headers of the numeric report columns, in sheet order.
const TOTAL_COLUMNS: [&str; 11] = [
    "NDP Sales TSO",
    "Upfront",
    "Backend",
    "Total Deal @Net Sales Out",
    "Other Exclusions Net Sales",
    "OEM Exclusions",
    "LA Sales",
    "Total Exclusions",
    "Total eligible DSO Deal@Net",
    "PG Coverage Sales",
    "SBP Coverage Sales",
];

const SUMMARY_COLUMNS: [&str; 18] = [
    "Incentive Name",
    "New Name",
    "Start Date",
    "End Date",
    "Amount",
    "Company Name",
    "Program %",
    "Days of Reporting",
    "Days in Quarter",
    "Program Goal",
    "SBP SDI",
    "Project Attainment",
    "Net QTD Performance",
    "Net Projected Performance",
    "Adjusted Amount",
    "Total Rebate Amount",
    "Projected Rebate Amount",
    "Comments",
];

fn total_cells(totals: &SchemeTotals) -> [CellValue; 11] {
    [
        totals.total_sales.into(),
        totals.upfront.into(),
        totals.backend.into(),
        totals.net_sales_out.into(),
        totals.other_exclusions.into(),
        totals.oem_exclusions.into(),
        totals.cross_region_sales.into(),
        totals.total_exclusions.into(),
        totals.eligible_net.into(),
        totals.pg_coverage.into(),
        totals.sbp_coverage.into(),
    ]
}

fn date_cell(date: Option<NaiveDate>) -> CellValue {
    date.map(CellValue::Date).unwrap_or_default()
}

fn blank_or(value: Option<f64>) -> CellValue {
    value.map(CellValue::Number).unwrap_or_default()
}

/// The scheme x product-line sheet.
pub fn scheme_table(report: &SchemeReport) -> Table {
    let mut columns = vec!["Program Name".to_string(), "PRODUCT_LINE".to_string()];
    columns.extend(report.month_columns());
    columns.extend(TOTAL_COLUMNS.iter().map(|c| c.to_string()));

    let mut table = Table::new(columns);
    for row in &report.rows {
        let mut cells = vec![
            CellValue::text(row.program.as_str()),
            CellValue::text(row.product_line.as_str()),
        ];
        cells.extend(row.monthly.iter().map(|v| CellValue::Number(*v)));
        cells.extend(total_cells(&row.totals));
        table.push_row(cells);
    }
    table
}

pub fn program_summary_table(month_columns: &[String], rows: &[ProgramSummaryRow]) -> Table {
    let mut columns = vec!["Program Name".to_string()];
    columns.extend(month_columns.iter().cloned());
    columns.extend(TOTAL_COLUMNS.iter().map(|c| c.to_string()));

    let mut table = Table::new(columns);
    for row in rows {
        let mut cells = vec![CellValue::text(row.program.as_str())];
        cells.extend(row.monthly.iter().map(|v| CellValue::Number(*v)));
        cells.extend(total_cells(&row.totals));
        table.push_row(cells);
    }
    table
}

pub fn allocation_table(rows: &[AllocationRow]) -> Table {
    let mut table = Table::new(SUMMARY_COLUMNS);
    for row in rows {
        table.push_row(vec![
            CellValue::text(row.incentive_name.as_str()),
            CellValue::text(row.new_name.as_str()),
            date_cell(row.start_date),
            date_cell(row.end_date),
            row.amount.into(),
            CellValue::text(row.company_name.as_str()),
            blank_or(row.program_percent),
            CellValue::Number(row.days_of_reporting as f64),
            CellValue::Number(row.days_in_quarter as f64),
            blank_or(row.program_goal),
            blank_or(row.sbp_sdi),
            blank_or(row.project_attainment),
            row.net_qtd_performance.into(),
            blank_or(row.net_projected_performance),
            blank_or(row.adjusted_amount),
            row.total_rebate_amount.into(),
            blank_or(row.projected_rebate_amount),
            CellValue::text(row.comments.as_str()),
        ]);
    }
    table
}

/// One excluded sale of a distributor partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionDetail {
    pub distributor_id: Option<String>,
    pub sales_order_number: Option<String>,
    pub invoice_number: Option<String>,
    pub exclusion_level: String,
    pub product_line: String,
    pub reseller_id: Option<String>,
    pub net: Option<f64>,
}

impl ExclusionDetail {
    pub fn from_record(record: &ClassifiedRecord, currency: Currency) -> Self {
        let raw = &record.record;
        Self {
            distributor_id: raw.distributor_id.clone(),
            sales_order_number: raw.sales_order_number.clone(),
            invoice_number: raw.invoice_number.clone(),
            exclusion_level: record.exclusion_level.clone().unwrap_or_default(),
            product_line: record.product_line().to_string(),
            reseller_id: raw.reseller_id.clone(),
            net: record.net(currency),
        }
    }
}

pub fn exclusion_table(rows: &[ExclusionDetail], currency: Currency) -> Table {
    let mut table = Table::new([
        "DISTRIBUTOR_PARTY_ID".to_string(),
        "HPE_SALES_ORDER_NUMBER".to_string(),
        "INVOICE_NUMBER".to_string(),
        "Exclusions".to_string(),
        "PRODUCT_LINE".to_string(),
        "RESELLER_PARTY_ID".to_string(),
        format!("NET_TOTAL_{}", currency.suffix()),
    ]);
    for row in rows {
        table.push_row(vec![
            row.distributor_id.clone().into(),
            row.sales_order_number.clone().into(),
            row.invoice_number.clone().into(),
            CellValue::text(row.exclusion_level.as_str()),
            CellValue::text(row.product_line.as_str()),
            row.reseller_id.clone().into(),
            row.net.into(),
        ]);
    }
    table
}

/// One sale in the Attach/Annuity extracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractRow {
    pub fiscal_quarter: String,
    pub distributor_id: Option<String>,
    pub distributor_name: Option<String>,
    pub reseller_id: Option<String>,
    pub reseller_name: Option<String>,
    pub product_line: String,
    pub product_number: Option<String>,
    pub net_usd: Option<f64>,
    pub invoice_number: Option<String>,
    pub sales_order_number: Option<String>,
}

impl ExtractRow {
    pub fn from_record(record: &ClassifiedRecord) -> Self {
        let raw = &record.record;
        Self {
            fiscal_quarter: raw
                .fiscal_month
                .map(|m| FiscalQuarter::from_fiscal_month(m).name())
                .unwrap_or_default(),
            distributor_id: raw.distributor_id.clone(),
            distributor_name: raw.distributor_name.clone(),
            reseller_id: raw.reseller_id.clone(),
            reseller_name: raw.reseller_name.clone(),
            product_line: record.product_line().to_string(),
            product_number: raw.product_number.clone(),
            net_usd: raw.usd.net,
            invoice_number: raw.invoice_number.clone(),
            sales_order_number: raw.sales_order_number.clone(),
        }
    }
}

fn extract_table(rows: &[ExtractRow], reference_column: &str, reference: impl Fn(&ExtractRow) -> Option<String>) -> Table {
    let mut table = Table::new([
        "Fiscal Quarter",
        "DISTRIBUTOR_PARTY_ID",
        "Distributor Party Name",
        "RESELLER_PARTY_ID",
        "Reseller Party Name",
        "PRODUCT_LINE",
        "Product Number",
        "NET_TOTAL_USD",
        reference_column,
    ]);
    for row in rows {
        table.push_row(vec![
            CellValue::text(row.fiscal_quarter.as_str()),
            row.distributor_id.clone().into(),
            row.distributor_name.clone().into(),
            row.reseller_id.clone().into(),
            row.reseller_name.clone().into(),
            CellValue::text(row.product_line.as_str()),
            row.product_number.clone().into(),
            row.net_usd.into(),
            reference(row).into(),
        ]);
    }
    table
}

pub fn attach_table(rows: &[ExtractRow]) -> Table {
    extract_table(rows, "INVOICE_NUMBER", |r| r.invoice_number.clone())
}

pub fn annuity_table(rows: &[ExtractRow]) -> Table {
    extract_table(rows, "HPE_SALES_ORDER_NUMBER", |r| r.sales_order_number.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionReport {
    pub region: String,
    pub workbook: String,
    pub sheet: String,
    pub report: SchemeReport,
    pub program_summary: Vec<ProgramSummaryRow>,
}

impl RegionReport {
    pub fn to_sheets(&self) -> Vec<Sheet> {
        vec![
            Sheet::new(self.sheet.as_str(), scheme_table(&self.report)),
            Sheet::new(
                sheets::PROGRAM_SUMMARY,
                program_summary_table(&self.report.month_columns(), &self.program_summary),
            ),
        ]
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerReport {
    pub region: String,
    pub partner_id: String,
    pub workbook: String,
    pub currency: Currency,
    pub company_name: Option<String>,
    /// Includes the appended as-a-service coverage row, if any.
    pub report: SchemeReport,
    pub program_summary: Vec<ProgramSummaryRow>,
    pub summary: Vec<AllocationRow>,
    pub summary2: Vec<AllocationRow>,
    pub exclusions: Vec<ExclusionDetail>,
    /// Present only for partners that get the Attach/Annuity extracts.
    pub extracts: Option<Vec<ExtractRow>>,
}

impl PartnerReport {
    pub fn to_sheets(&self) -> Vec<Sheet> {
        let mut out = vec![
            Sheet::new(sheets::DSO_DATASHEET, scheme_table(&self.report)),
            Sheet::new(
                sheets::PROGRAM_SUMMARY,
                program_summary_table(&self.report.month_columns(), &self.program_summary),
            ),
            Sheet::new(sheets::SUMMARY, allocation_table(&self.summary)),
        ];

        if !self.summary2.is_empty() {
            out.push(Sheet::new(sheets::SUMMARY2, allocation_table(&self.summary2)));
        }
        if !self.exclusions.is_empty() {
            out.push(Sheet::new(
                sheets::EXCLUSIONS_DATA,
                exclusion_table(&self.exclusions, self.currency),
            ));
        }
        if let Some(extracts) = &self.extracts {
            out.push(Sheet::new(sheets::ATTACH, attach_table(extracts)));
            out.push(Sheet::new(sheets::ANNUITY, annuity_table(extracts)));
        }

        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
