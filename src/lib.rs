//! # Flash Report
//!
//! Reconciles regional sales extracts against reference rules and produces
//! per-region and per-distributor-partner incentive reports.
//!
//! ## Core Concepts
//!
//! - **Filter chain**: five gates drop records that must never be reported and
//!   set aside the alternate reporting type as cross-region sales
//! - **Classification**: each record gets a scheme (business unit + program
//!   type), a product family, an exclusion level and a PG/SBP coverage class
//! - **Scheme report**: monthly list-price sales per scheme and product line,
//!   with discounts, exclusions and eligible net sales alongside
//! - **Allocation**: program coverage totals turned into rebate amounts and
//!   projected to quarter end from elapsed reporting days
//!
//! ## Example
//!
//! ```rust,ignore
//! use flash_report::*;
//! use chrono::NaiveDate;
//!
//! let config = FlashReportConfig::default();
//! let inputs = RunInputs {
//!     transactions: "Flash_Data".to_string(),
//!     references: [("US".to_string(), "Reference_US".to_string())].into(),
//!     calendars: [("US".to_string(), "Calendar_US".to_string())].into(),
//!     saas: None,
//!     rebates: None,
//! };
//!
//! let mut sink = MemoryWorkbook::new();
//! let run_date = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
//! let result = process_flash_report(&config, run_date, inputs, &source, &mut sink)?;
//! ```

pub mod aggregate;
pub mod calendar;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod pipeline;
pub mod rebate;
pub mod reconcile;
pub mod report;
pub mod resolver;
pub mod saas;
pub mod schema;
pub mod table;
pub mod utils;

pub use aggregate::{
    index_unique, partner_ids, Populations, ProgramSummaryRow, ReportBuilder, SchemeReport,
    SchemeRow, SchemeTotals,
};
pub use calendar::{
    in_quarter_change_window, quarter_labels, FiscalQuarter, ReportingCalendar,
    ReportingCalendarEntry,
};
pub use classify::{apply_filters, classify, classify_all, FilterOutcome, GateCount};
pub use config::*;
pub use error::{Diagnostic, FlashReportError, Result};
pub use pipeline::{
    FlashReportPipeline, OutcomeStatus, PartnerOutcome, RegionOutcome, RunContext, RunInputs,
    RunResult,
};
pub use rebate::{
    allocate, ledger_rows, project, AllocationContext, AllocationRow, RebateLedger, SchemeRebate,
};
pub use reconcile::reconcile;
pub use report::{ExclusionDetail, ExtractRow, PartnerReport, RegionReport};
pub use resolver::{close_matches, similarity, Resolution, SchemaResolver};
pub use saas::{EligibleSales, LocationDirectory, SaasCoverage, SaasRecord};
pub use schema::*;
pub use table::{CellValue, MemoryWorkbook, Sheet, Table, WorkbookSink, WorkbookSource};
pub use utils::*;

use chrono::NaiveDate;
use log::{debug, info};

pub struct FlashReportProcessor;

impl FlashReportProcessor {
    pub fn process(
        config: &FlashReportConfig,
        run_date: NaiveDate,
        inputs: RunInputs,
        source: &dyn WorkbookSource,
        sink: &mut dyn WorkbookSink,
    ) -> Result<RunResult> {
        config.validate()?;

        info!(
            "Processing flash report for {} across {} regions",
            run_date,
            config.regions.len()
        );
        debug!(
            "Inputs: transactions '{}', {} reference and {} calendar workbooks",
            inputs.transactions,
            inputs.references.len(),
            inputs.calendars.len()
        );

        let ctx = RunContext::new(config, run_date, inputs);
        let result = FlashReportPipeline::new(&ctx).run(source, sink)?;

        if !result.diagnostics.is_empty() {
            for diagnostic in &result.diagnostics {
                debug!("Run diagnostic: {}", diagnostic);
            }
        }

        Ok(result)
    }

    /// Runs and then checks the arithmetic identities of every written report.
    pub fn process_with_verification(
        config: &FlashReportConfig,
        run_date: NaiveDate,
        inputs: RunInputs,
        source: &dyn WorkbookSource,
        sink: &mut dyn WorkbookSink,
        tolerance: f64,
    ) -> Result<RunResult> {
        let result = Self::process(config, run_date, inputs, source, sink)?;

        for region in &result.regions {
            if let Some(report) = &region.report {
                verify_report(&region.region, &report.report, tolerance)?;
            }
            for partner in &region.partners {
                if let Some(report) = &partner.report {
                    let context = format!("{} partner {}", region.region, partner.partner_id);
                    verify_report(&context, &report.report, tolerance)?;
                }
            }
        }

        Ok(result)
    }
}

pub fn process_flash_report(
    config: &FlashReportConfig,
    run_date: NaiveDate,
    inputs: RunInputs,
    source: &dyn WorkbookSource,
    sink: &mut dyn WorkbookSink,
) -> Result<RunResult> {
    FlashReportProcessor::process(config, run_date, inputs, source, sink)
}

pub fn process_with_verification(
    config: &FlashReportConfig,
    run_date: NaiveDate,
    inputs: RunInputs,
    source: &dyn WorkbookSource,
    sink: &mut dyn WorkbookSink,
    tolerance: f64,
) -> Result<RunResult> {
    FlashReportProcessor::process_with_verification(config, run_date, inputs, source, sink, tolerance)
}

/// Checks that every row of `report` satisfies the column identities.
pub fn verify_report(context: &str, report: &SchemeReport, tolerance: f64) -> Result<()> {
    for row in &report.rows {
        let t = &row.totals;
        let monthly: f64 = row.monthly.iter().sum();

        let checks = [
            ("monthly sales", monthly, t.total_sales),
            ("net sales out", t.total_sales - t.upfront - t.backend, t.net_sales_out),
            (
                "total exclusions",
                t.other_exclusions + t.oem_exclusions + t.cross_region_sales,
                t.total_exclusions,
            ),
            ("eligible net", t.net_sales_out - t.total_exclusions, t.eligible_net),
        ];

        for (name, expected, actual) in checks {
            if (expected - actual).abs() > tolerance {
                return Err(FlashReportError::Verification {
                    context: context.to_string(),
                    details: format!(
                        "{} / {}: {} is {:.2}, expected {:.2}",
                        row.program, row.product_line, name, actual, expected
                    ),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(monthly: Vec<f64>, totals: SchemeTotals) -> SchemeRow {
        SchemeRow {
            program: "ComputeStandard".to_string(),
            product_line: "AB".to_string(),
            monthly,
            totals,
        }
    }

    #[test]
    fn test_verify_report_accepts_consistent_rows() {
        let report = SchemeReport {
            months: vec![FiscalMonth { year: 2025, month: 8 }],
            rows: vec![row(
                vec![1000.0],
                SchemeTotals {
                    total_sales: 1000.0,
                    upfront: 100.0,
                    backend: 50.0,
                    net_sales_out: 850.0,
                    oem_exclusions: 200.0,
                    total_exclusions: 200.0,
                    eligible_net: 650.0,
                    ..Default::default()
                },
            )],
        };

        assert!(verify_report("US", &report, 0.01).is_ok());
    }

    #[test]
    fn test_verify_report_flags_broken_identity() {
        let report = SchemeReport {
            months: vec![FiscalMonth { year: 2025, month: 8 }],
            rows: vec![row(
                vec![1000.0],
                SchemeTotals {
                    total_sales: 1000.0,
                    net_sales_out: 1000.0,
                    eligible_net: 900.0,
                    ..Default::default()
                },
            )],
        };

        let result = verify_report("US", &report, 0.01);
        assert!(matches!(result, Err(FlashReportError::Verification { .. })));
    }
}
