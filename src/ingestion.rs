use crate::error::Diagnostic;
use crate::schema::{Amounts, DataType, FiscalMonth, ReferenceRow, TransactionRecord};
use crate::table::{CellValue, Table};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Canonical transaction fields.
pub mod fields {
    pub const SRC_SYS_KY: &str = "SRC_SYS_KY";
    pub const CROSS_SOURCED: &str = "CROSS_SOURCED";
    pub const BDE_FLAG: &str = "BDE_FLAG";
    pub const MSP_FLAG: &str = "MSP_FLAG";
    pub const REPORTING_TYPE: &str = "REPORTING_TYPE";
    pub const PRODUCT_LINE: &str = "PRODUCT_LINE";
    pub const RESELLER_PARTY_ID: &str = "RESELLER_PARTY_ID";
    pub const DISTRIBUTOR_PARTY_ID: &str = "DISTRIBUTOR_PARTY_ID";
    pub const FISCAL_MONTH: &str = "FISCAL_MONTH";
    pub const NDP_TOTAL_USD: &str = "NDP_TOTAL_USD";
    pub const NET_TOTAL_USD: &str = "NET_TOTAL_USD";
    pub const UPFRONT_DISCOUNT_AMT_USD: &str = "UPFRONT_DISCOUNT_AMT_USD";
    pub const BACKEND_DISCOUNT_AMT_USD: &str = "BACKEND_DISCOUNT_AMT_USD";
    pub const DATA_TYPE: &str = "DATA_TYPE";
    pub const BACKEND_DEAL_1: &str = "BACKEND_DEAL_1";
    pub const INVOICE_NUMBER: &str = "INVOICE_NUMBER";
    pub const HPE_SALES_ORDER_NUMBER: &str = "HPE_SALES_ORDER_NUMBER";
    pub const NET_TOTAL_LC: &str = "NET_TOTAL_LC";
    pub const BACKEND_DISCOUNT_AMT_LC: &str = "BACKEND_DISCOUNT_AMT_LC";
    pub const UPFRONT_DISCOUNT_AMT_LC: &str = "UPFRONT_DISCOUNT_AMT_LC";
    pub const NDP_TOTAL_LC: &str = "NDP_TOTAL_LC";
    pub const DISTRIBUTOR_PARTY_NAME: &str = "DISTRIBUTOR_PARTY_NAME";
    pub const RESELLER_PARTY_NAME: &str = "RESELLER_PARTY_NAME";
    pub const PRODUCT_NUMBER: &str = "PRODUCT_NUMBER";
    pub const PORTFOLIO_MAPPING_1: &str = "PORTFOLIO_MAPPING_1";
    pub const PORTFOLIO_MAPPING_2: &str = "PORTFOLIO_MAPPING_2";

    pub const PL: &str = "PL";
    pub const BU: &str = "BU";
    pub const TYPE: &str = "TYPE";
    pub const EXCLUSION_PARTY_ID: &str = "EXCLUSION_PARTY_ID";
    pub const EXCLUSION_LEVEL: &str = "EXCLUSION_LEVEL";
    pub const PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID: &str = "PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID";
    pub const LOC_ID: &str = "LOC_ID";
    pub const ELICPES: &str = "ELICPES";
    pub const PN_PL: &str = "PN_PL";
    pub const BU_1: &str = "BU_1";
    pub const COMMON_PL: &str = "COMMON_PL";
    pub const COMMON_PN_PL: &str = "COMMON_PN_PL";
}

/// Identifier view of a cell. Integral numbers, including numeric text such
/// as "2032.0", render without a fractional part.
pub fn id_text(cell: &CellValue) -> Option<String> {
    match cell.as_f64() {
        Some(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Some(format!("{}", n as i64)),
        _ => cell.as_text(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

struct RowReader<'a> {
    dataset: &'a str,
    table: &'a Table,
    index: BTreeMap<&'static str, usize>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> RowReader<'a> {
    fn new(dataset: &'a str, table: &'a Table, names: &[&'static str]) -> Self {
        let index = names
            .iter()
            .filter_map(|name| table.column_index(name).map(|idx| (*name, idx)))
            .collect();
        Self {
            dataset,
            table,
            index,
            diagnostics: Vec::new(),
        }
    }

    fn cell(&self, row: usize, name: &str) -> Option<&'a CellValue> {
        self.index.get(name).map(|idx| self.table.cell(row, *idx))
    }

    fn text(&self, row: usize, name: &str) -> Option<String> {
        self.cell(row, name).and_then(CellValue::as_text)
    }

    fn id(&self, row: usize, name: &str) -> Option<String> {
        self.cell(row, name).and_then(id_text)
    }

    fn coercion(&mut self, row: usize, name: &str, cell: &CellValue) {
        self.diagnostics.push(Diagnostic::NumericCoercion {
            dataset: self.dataset.to_string(),
            column: name.to_string(),
            row,
            value: cell.to_string(),
        });
    }

    fn number(&mut self, row: usize, name: &str) -> Option<f64> {
        let cell = self.cell(row, name)?;
        if cell.is_blank() {
            return None;
        }
        let value = cell.as_f64();
        if value.is_none() {
            self.coercion(row, name, cell);
        }
        value
    }

    fn integer(&mut self, row: usize, name: &str) -> Option<i64> {
        let cell = self.cell(row, name)?;
        if cell.is_blank() {
            return None;
        }
        let value = cell.as_i64();
        if value.is_none() {
            self.coercion(row, name, cell);
        }
        value
    }

    fn fiscal_month(&mut self, row: usize) -> Option<FiscalMonth> {
        let raw = self.integer(row, fields::FISCAL_MONTH)?;
        match FiscalMonth::from_yyyymm(raw) {
            Ok(month) => Some(month),
            Err(e) => {
                debug!("{}: row {}: {}", self.dataset, row, e);
                if let Some(cell) = self.cell(row, fields::FISCAL_MONTH) {
                    self.coercion(row, fields::FISCAL_MONTH, cell);
                }
                None
            }
        }
    }

    fn finish(self) -> Vec<Diagnostic> {
        if !self.diagnostics.is_empty() {
            let mut per_column: BTreeMap<&str, usize> = BTreeMap::new();
            for diagnostic in &self.diagnostics {
                if let Diagnostic::NumericCoercion { column, .. } = diagnostic {
                    *per_column.entry(column.as_str()).or_default() += 1;
                }
            }
            for (column, count) in per_column {
                warn!(
                    "{}: {} non-numeric value(s) in '{}' treated as missing",
                    self.dataset, count, column
                );
            }
        }
        self.diagnostics
    }
}

/// Converts a resolved transaction table into typed records. Non-numeric
/// monetary or id cells become missing values and are reported.
pub fn transactions_from_table(dataset: &str, table: &Table) -> Ingested<TransactionRecord> {
    use fields::*;

    let mut reader = RowReader::new(
        dataset,
        table,
        &[
            SRC_SYS_KY,
            CROSS_SOURCED,
            BDE_FLAG,
            MSP_FLAG,
            REPORTING_TYPE,
            PRODUCT_LINE,
            RESELLER_PARTY_ID,
            DISTRIBUTOR_PARTY_ID,
            FISCAL_MONTH,
            NDP_TOTAL_USD,
            NET_TOTAL_USD,
            UPFRONT_DISCOUNT_AMT_USD,
            BACKEND_DISCOUNT_AMT_USD,
            DATA_TYPE,
            BACKEND_DEAL_1,
            INVOICE_NUMBER,
            HPE_SALES_ORDER_NUMBER,
            NET_TOTAL_LC,
            BACKEND_DISCOUNT_AMT_LC,
            UPFRONT_DISCOUNT_AMT_LC,
            NDP_TOTAL_LC,
            DISTRIBUTOR_PARTY_NAME,
            RESELLER_PARTY_NAME,
            PRODUCT_NUMBER,
            PORTFOLIO_MAPPING_1,
            PORTFOLIO_MAPPING_2,
        ],
    );

    let mut records = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let record = TransactionRecord {
            source_system: reader.integer(row, SRC_SYS_KY),
            cross_sourced: reader.text(row, CROSS_SOURCED),
            bde_flag: reader.text(row, BDE_FLAG),
            msp_flag: reader.text(row, MSP_FLAG),
            reporting_type: reader.text(row, REPORTING_TYPE),
            product_line: reader.text(row, PRODUCT_LINE),
            reseller_id: reader.id(row, RESELLER_PARTY_ID),
            distributor_id: reader.id(row, DISTRIBUTOR_PARTY_ID),
            fiscal_month: reader.fiscal_month(row),
            usd: Amounts {
                list_price: reader.number(row, NDP_TOTAL_USD),
                net: reader.number(row, NET_TOTAL_USD),
                upfront: reader.number(row, UPFRONT_DISCOUNT_AMT_USD),
                backend: reader.number(row, BACKEND_DISCOUNT_AMT_USD),
            },
            local: Amounts {
                list_price: reader.number(row, NDP_TOTAL_LC),
                net: reader.number(row, NET_TOTAL_LC),
                upfront: reader.number(row, UPFRONT_DISCOUNT_AMT_LC),
                backend: reader.number(row, BACKEND_DISCOUNT_AMT_LC),
            },
            data_type: reader.text(row, DATA_TYPE).map(|s| DataType::parse(&s)),
            backend_deal: reader.id(row, BACKEND_DEAL_1),
            invoice_number: reader.id(row, INVOICE_NUMBER),
            sales_order_number: reader.id(row, HPE_SALES_ORDER_NUMBER),
            distributor_name: reader.text(row, DISTRIBUTOR_PARTY_NAME),
            reseller_name: reader.text(row, RESELLER_PARTY_NAME),
            product_number: reader.text(row, PRODUCT_NUMBER),
            portfolio_mapping_1: reader.text(row, PORTFOLIO_MAPPING_1),
            portfolio_mapping_2: reader.text(row, PORTFOLIO_MAPPING_2),
        };
        records.push(record);
    }

    debug!("{}: ingested {} transaction rows", dataset, records.len());

    Ingested {
        records,
        diagnostics: reader.finish(),
    }
}

/// Converts a resolved reference table into rows. Ids use [`id_text`] so they
/// compare equal to the transaction side.
pub fn reference_rows_from_table(dataset: &str, table: &Table) -> Vec<ReferenceRow> {
    use fields::*;

    let reader = RowReader::new(
        dataset,
        table,
        &[
            PL,
            BU,
            TYPE,
            EXCLUSION_PARTY_ID,
            EXCLUSION_LEVEL,
            PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID,
            LOC_ID,
            ELICPES,
            PN_PL,
            BU_1,
            COMMON_PL,
            COMMON_PN_PL,
        ],
    );

    let rows: Vec<ReferenceRow> = (0..table.len())
        .map(|row| ReferenceRow {
            product_line: reader.text(row, PL),
            business_unit: reader.text(row, BU),
            program_type: reader.text(row, TYPE),
            exclusion_party_id: reader.id(row, EXCLUSION_PARTY_ID),
            exclusion_level: reader.text(row, EXCLUSION_LEVEL),
            pg_eligible_party_id: reader.id(row, PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID),
            location_id: reader.id(row, LOC_ID),
            eligible_deal: reader.id(row, ELICPES),
            standalone_product_line: reader.text(row, PN_PL),
            standalone_tag: reader.text(row, BU_1),
            common_product_line: reader.text(row, COMMON_PL),
            common_tag: reader.text(row, COMMON_PN_PL),
        })
        .collect();

    debug!("{}: ingested {} reference rows", dataset, rows.len());
    rows
}
