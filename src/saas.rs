//! As-a-service coverage from the contract-value ledger.
//!
//! The ledger workbook has one sheet per region plus an eligible-sales sheet
//! listing the eligible product lines, each region's distributor locations and
//! their company names. Eligible contract value is credited to the selling
//! distributor as ComputeFocus coverage.

use crate::aggregate::{SchemeRow, SchemeTotals};
use crate::config::{RegionConfig, SaasConfig};
use crate::error::Diagnostic;
use crate::ingestion::id_text;
use crate::schema::{Coverage, ReferenceRules};
use crate::table::{CellValue, Table};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaasRecord {
    pub product_line: Option<String>,
    pub seller_id: Option<String>,
    pub buyer_id: Option<String>,
    pub tcv: Option<f64>,
}

/// A region's distributor locations and their company names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationDirectory {
    pub locations: BTreeSet<String>,
    pub company_names: BTreeMap<String, String>,
}

impl LocationDirectory {
    pub fn company_name(&self, partner: &str) -> Option<&str> {
        self.company_names.get(partner).map(String::as_str)
    }
}

/// The eligible-sales sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibleSales {
    pub product_lines: BTreeSet<String>,
    /// Region code -> directory.
    pub directories: BTreeMap<String, LocationDirectory>,
}

impl EligibleSales {
    pub fn from_table(table: &Table, config: &SaasConfig, regions: &[RegionConfig]) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let mut missing = |column: &str| {
            let diagnostic = Diagnostic::data_shape(
                "eligible sales",
                format!("column '{column}' not found"),
            );
            warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
        };

        if !table.has_column(&config.eligible_product_line_column) {
            missing(&config.eligible_product_line_column);
        }
        let product_lines = table
            .column_values(&config.eligible_product_line_column)
            .into_iter()
            .filter_map(CellValue::as_text)
            .collect();

        let mut directories = BTreeMap::new();
        for region in regions {
            if !table.has_column(&region.saas_location_column) {
                missing(&region.saas_location_column);
            }

            let mut directory = LocationDirectory::default();
            for row in 0..table.len() {
                let Some(location) = table.value(row, &region.saas_location_column).and_then(id_text) else {
                    continue;
                };
                if let Some(name) = table
                    .value(row, &region.saas_company_column)
                    .and_then(CellValue::as_text)
                {
                    directory.company_names.insert(location.clone(), name);
                }
                directory.locations.insert(location);
            }

            debug!(
                "{} eligible sales: {} locations, {} company names",
                region.code,
                directory.locations.len(),
                directory.company_names.len()
            );
            directories.insert(region.code.clone(), directory);
        }

        (
            Self {
                product_lines,
                directories,
            },
            diagnostics,
        )
    }

    pub fn directory(&self, region: &str) -> Option<&LocationDirectory> {
        self.directories.get(region)
    }
}

/// Reads a region's ledger sheet. A sheet missing any required column is
/// skipped as a whole.
pub fn saas_records_from_table(
    region: &RegionConfig,
    table: &Table,
    config: &SaasConfig,
) -> std::result::Result<Vec<SaasRecord>, Diagnostic> {
    let required = [
        config.product_line_column.as_str(),
        config.seller_column.as_str(),
        config.buyer_column.as_str(),
        region.saas_amount_column.as_str(),
    ];
    let missing: Vec<&str> = required
        .into_iter()
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        let diagnostic = Diagnostic::data_shape(
            format!("{} as-a-service ledger", region.code),
            format!("missing required columns {:?}; coverage skipped", missing),
        );
        warn!("{}", diagnostic);
        return Err(diagnostic);
    }

    let records = (0..table.len())
        .map(|row| SaasRecord {
            product_line: table
                .value(row, &config.product_line_column)
                .and_then(CellValue::as_text),
            seller_id: table.value(row, &config.seller_column).and_then(id_text),
            buyer_id: table.value(row, &config.buyer_column).and_then(id_text),
            tcv: table
                .value(row, &region.saas_amount_column)
                .and_then(CellValue::as_f64),
        })
        .collect::<Vec<_>>();

    debug!("{} as-a-service ledger: {} rows", region.code, records.len());
    Ok(records)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SaasCoverage {
    pub pg: f64,
    pub sbp: f64,
}

impl SaasCoverage {
    pub fn is_positive(&self) -> bool {
        self.pg > 0.0 || self.sbp > 0.0
    }
}

/// Contract value per selling distributor, split by the buyer's coverage.
/// Buyers with an exclusion level are left out.
pub fn coverage_by_partner(
    records: &[SaasRecord],
    eligible: &EligibleSales,
    directory: &LocationDirectory,
    rules: &ReferenceRules,
) -> BTreeMap<String, SaasCoverage> {
    let mut totals: BTreeMap<String, SaasCoverage> = BTreeMap::new();
    let mut kept = 0usize;

    for record in records {
        let eligible_line = record
            .product_line
            .as_ref()
            .is_some_and(|pl| eligible.product_lines.contains(pl));
        let Some(partner) = record
            .seller_id
            .as_ref()
            .filter(|seller| directory.locations.contains(*seller))
        else {
            continue;
        };
        if !eligible_line {
            continue;
        }

        let buyer = record.buyer_id.as_deref().unwrap_or("");
        if rules.exclusion_levels.contains_key(buyer) {
            continue;
        }
        kept += 1;

        let coverage = if rules.pg_eligible.contains(buyer) {
            Coverage::Pg
        } else {
            Coverage::Sbp
        };
        let entry = totals.entry(partner.clone()).or_default();
        let amount = record.tcv.unwrap_or(0.0);
        match coverage {
            Coverage::Pg => entry.pg += amount,
            Coverage::Sbp => entry.sbp += amount,
        }
    }

    info!(
        "As-a-service coverage: {} eligible rows across {} partners",
        kept,
        totals.len()
    );
    totals
}

/// The report row crediting a partner's contract value, if any is positive.
pub fn coverage_row(coverage: &SaasCoverage, months: usize, config: &SaasConfig) -> Option<SchemeRow> {
    if !coverage.is_positive() {
        return None;
    }

    Some(SchemeRow {
        program: config.program.clone(),
        product_line: config.product_line.clone(),
        monthly: vec![0.0; months],
        totals: SchemeTotals {
            pg_coverage: coverage.pg,
            sbp_coverage: coverage.sbp,
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReferenceRow;

    fn eligible_table() -> Table {
        let mut table = Table::new([
            "Saas eligible PL's",
            "US_Loc Id",
            "US_RS Company Name",
            "CA_Loc Id",
            "CA_RS Company Name",
        ]);
        table.push_row(vec![
            CellValue::text("S3"),
            CellValue::Number(900.0),
            CellValue::text("Northwind Distribution"),
            CellValue::Number(950.0),
            CellValue::text("Maple Supply"),
        ]);
        table.push_row(vec![
            CellValue::text("HX"),
            CellValue::Number(901.0),
            CellValue::Empty,
            CellValue::Empty,
            CellValue::Empty,
        ]);
        table
    }

    fn ledger_table() -> Table {
        let mut table = Table::new([
            "PRODUCTLINE_ID",
            "REPORTING_SELLER_ID",
            "BUYER_PARTNER_ID",
            "TCV_NET_EXTENDED_AMOUNT",
        ]);
        let rows = [
            ("S3", 900.0, 10.0, 1000.0),
            ("S3", 900.0, 11.0, 400.0),
            ("HX", 900.0, 11.0, 100.0),
            ("ZZ", 900.0, 11.0, 9999.0),
            ("S3", 999.0, 11.0, 9999.0),
            ("S3", 900.0, 66.0, 9999.0),
        ];
        for (pl, seller, buyer, tcv) in rows {
            table.push_row(vec![
                CellValue::text(pl),
                CellValue::Number(seller),
                CellValue::Number(buyer),
                CellValue::Number(tcv),
            ]);
        }
        table
    }

    fn rules() -> ReferenceRules {
        let rows = vec![
            ReferenceRow {
                pg_eligible_party_id: Some("10".to_string()),
                exclusion_party_id: Some("66".to_string()),
                exclusion_level: Some("Gov".to_string()),
                ..Default::default()
            },
            ReferenceRow {
                exclusion_party_id: Some("11".to_string()),
                exclusion_level: Some("NA".to_string()),
                ..Default::default()
            },
        ];
        ReferenceRules::from_rows(&rows, &["NA".to_string()])
    }

    #[test]
    fn test_eligible_sales_directory() {
        let regions = [RegionConfig::us(), RegionConfig::ca()];
        let (eligible, diagnostics) = EligibleSales::from_table(&eligible_table(), &SaasConfig::default(), &regions);
        assert!(diagnostics.is_empty());
        assert!(eligible.product_lines.contains("HX"));

        let us = eligible.directory("US").unwrap();
        assert_eq!(us.locations.len(), 2);
        assert_eq!(us.company_name("900"), Some("Northwind Distribution"));
        assert_eq!(us.company_name("901"), None);

        let ca = eligible.directory("CA").unwrap();
        assert_eq!(ca.locations.len(), 1);
        assert_eq!(ca.company_name("950"), Some("Maple Supply"));
    }

    #[test]
    fn test_coverage_by_partner() {
        let config = SaasConfig::default();
        let region = RegionConfig::us();
        let (eligible, _) = EligibleSales::from_table(&eligible_table(), &config, &[region.clone()]);
        let records = saas_records_from_table(&region, &ledger_table(), &config).unwrap();

        let totals = coverage_by_partner(&records, &eligible, eligible.directory("US").unwrap(), &rules());
        assert_eq!(totals.len(), 1);
        let coverage = totals["900"];
        assert!((coverage.pg - 1000.0).abs() < 0.01);
        assert!((coverage.sbp - 500.0).abs() < 0.01);
    }

    #[test]
    fn test_missing_ledger_columns_skip_region() {
        let table = Table::new(["PRODUCTLINE_ID", "REPORTING_SELLER_ID"]);
        let result = saas_records_from_table(&RegionConfig::ca(), &table, &SaasConfig::default());
        assert!(matches!(result, Err(Diagnostic::DataShape { .. })));
    }

    #[test]
    fn test_coverage_row() {
        let config = SaasConfig::default();
        let row = coverage_row(&SaasCoverage { pg: 10.0, sbp: 0.0 }, 3, &config).unwrap();
        assert_eq!(row.program, "ComputeFocus");
        assert_eq!(row.product_line, "S3");
        assert_eq!(row.monthly, vec![0.0; 3]);
        assert_eq!(row.totals.pg_coverage, 10.0);
        assert_eq!(row.totals.total_sales, 0.0);

        assert!(coverage_row(&SaasCoverage::default(), 3, &config).is_none());
    }
}
