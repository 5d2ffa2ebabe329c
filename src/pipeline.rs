//! The run: one pass over the transaction extract, then one unit of work per
//! region and per distributor partner.
//!
//! Schema resolution failures abort the run. A missing calendar date aborts
//! only its region, and a failing partner only that partner.

use crate::aggregate::{partner_ids, ReportBuilder};
use crate::calendar::{
    in_quarter_change_window, quarter_labels, FiscalQuarter, ReportingCalendar,
    QUARTER_CHANGE_GRACE_DAYS,
};
use crate::classify::{apply_filters, classify_all, GateCount};
use crate::config::{FlashReportConfig, RegionConfig};
use crate::error::{Diagnostic, FlashReportError, Result};
use crate::ingestion::{fields, reference_rows_from_table, transactions_from_table};
use crate::rebate::{allocate, apply_company_name, ledger_rows, AllocationContext, RebateLedger, SchemeRebate};
use crate::report::{ExclusionDetail, ExtractRow, PartnerReport, RegionReport};
use crate::resolver::SchemaResolver;
use crate::saas::{
    coverage_by_partner, coverage_row, saas_records_from_table, EligibleSales, LocationDirectory,
    SaasCoverage,
};
use crate::schema::{ClassifiedRecord, ReferenceRules, TransactionRecord};
use crate::table::{WorkbookSink, WorkbookSource};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Workbook names of every input, as understood by the [`WorkbookSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInputs {
    pub transactions: String,
    /// Region code -> reference workbook (first sheet is read).
    pub references: BTreeMap<String, String>,
    /// Region code -> reporting calendar workbook (first sheet is read).
    pub calendars: BTreeMap<String, String>,
    /// Multi-sheet as-a-service ledger; coverage is skipped without it.
    pub saas: Option<String>,
    /// Rebate workbook with the summary and details sheets.
    pub rebates: Option<String>,
}

/// Everything a run needs, passed explicitly between stages.
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub config: &'a FlashReportConfig,
    pub run_date: NaiveDate,
    pub quarter: FiscalQuarter,
    pub inputs: RunInputs,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a FlashReportConfig, run_date: NaiveDate, inputs: RunInputs) -> Self {
        Self {
            config,
            run_date,
            quarter: FiscalQuarter::from_date(run_date),
            inputs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Written,
    Skipped(String),
    Failed(String),
}

impl OutcomeStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerOutcome {
    pub partner_id: String,
    pub status: OutcomeStatus,
    pub report: Option<PartnerReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOutcome {
    pub region: String,
    pub status: OutcomeStatus,
    pub report: Option<RegionReport>,
    pub partners: Vec<PartnerOutcome>,
}

impl RegionOutcome {
    fn failed(region: &str, error: &FlashReportError) -> Self {
        warn!("Region {} failed: {}", region, error);
        Self {
            region: region.to_string(),
            status: OutcomeStatus::Failed(error.to_string()),
            report: None,
            partners: Vec::new(),
        }
    }

    pub fn partner(&self, partner_id: &str) -> Option<&PartnerOutcome> {
        self.partners.iter().find(|p| p.partner_id == partner_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub quarter: FiscalQuarter,
    pub gate_counts: Vec<GateCount>,
    pub regions: Vec<RegionOutcome>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunResult {
    pub fn region(&self, code: &str) -> Option<&RegionOutcome> {
        self.regions.iter().find(|r| r.region == code)
    }
}

/// Inputs shared by all regions, loaded once.
struct SharedInputs {
    kept: Vec<Rc<TransactionRecord>>,
    cross_region: Vec<Rc<TransactionRecord>>,
    references: BTreeMap<String, ReferenceRules>,
    extract_columns: bool,
    eligible: Option<EligibleSales>,
    ledger: Option<RebateLedger>,
}

/// Per-region state every partner of the region reads.
struct RegionState<'r> {
    region: &'r RegionConfig,
    builder: ReportBuilder,
    classified: Vec<ClassifiedRecord>,
    cross_region: &'r [Rc<TransactionRecord>],
    allocation: AllocationContext,
    saas: BTreeMap<String, SaasCoverage>,
    rebates: Vec<SchemeRebate>,
    directory: Option<&'r LocationDirectory>,
    extract_columns: bool,
}

pub struct FlashReportPipeline<'a> {
    ctx: &'a RunContext<'a>,
}

impl<'a> FlashReportPipeline<'a> {
    pub fn new(ctx: &'a RunContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn run(&self, source: &dyn WorkbookSource, sink: &mut dyn WorkbookSink) -> Result<RunResult> {
        let ctx = self.ctx;
        let (current, previous) = quarter_labels(ctx.run_date);
        info!("Flash report run for {} (quarter {})", ctx.run_date, current);
        if in_quarter_change_window(ctx.run_date, QUARTER_CHANGE_GRACE_DAYS) {
            info!(
                "{} falls in the quarter-change window; {} data may still be settling",
                ctx.run_date, previous
            );
        }

        let mut diagnostics = Vec::new();
        let (shared, gate_counts) = self.load_shared(source, &mut diagnostics)?;

        let mut regions = Vec::with_capacity(ctx.config.regions.len());
        for region in &ctx.config.regions {
            let outcome = match self.run_region(region, &shared, source, sink, &mut diagnostics) {
                Ok(outcome) => outcome,
                Err(e) => RegionOutcome::failed(&region.code, &e),
            };
            regions.push(outcome);
        }

        info!(
            "Run complete: {} of {} regions written",
            regions.iter().filter(|r| r.status.is_written()).count(),
            regions.len()
        );

        Ok(RunResult {
            quarter: ctx.quarter,
            gate_counts,
            regions,
            diagnostics,
        })
    }

    fn load_shared(
        &self,
        source: &dyn WorkbookSource,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(SharedInputs, Vec<GateCount>)> {
        let config = self.ctx.config;
        let inputs = &self.ctx.inputs;

        let raw = source.read_first_sheet(&inputs.transactions)?;
        info!("Loaded {} transaction rows", raw.len());

        let main = SchemaResolver::new(&config.column_mappings.main_file_mappings, &config.resolver);
        let resolved = main.resolve_table("transactions", &raw, &config.required_main_fields)?;
        let extract_columns = [
            fields::DISTRIBUTOR_PARTY_NAME,
            fields::RESELLER_PARTY_NAME,
            fields::PRODUCT_NUMBER,
        ]
        .iter()
        .all(|c| resolved.has_column(c));

        let ingested = transactions_from_table("transactions", &resolved);
        diagnostics.extend(ingested.diagnostics);
        let filtered = apply_filters(ingested.records, &config.filters);

        let reference = SchemaResolver::new(
            &config.column_mappings.reference_file_mappings,
            &config.resolver,
        );
        let mut references = BTreeMap::new();
        for region in &config.regions {
            let workbook = inputs
                .references
                .get(&region.code)
                .ok_or_else(|| FlashReportError::MissingWorkbook(format!("{} reference", region.code)))?;
            let dataset = format!("{} reference", region.code);
            let table = source.read_first_sheet(workbook)?;
            let table = reference.resolve_table(&dataset, &table, &config.required_reference_fields)?;
            let rows = reference_rows_from_table(&dataset, &table);
            references.insert(
                region.code.clone(),
                ReferenceRules::from_rows(&rows, &config.classification.no_exclusion_markers),
            );
        }

        let eligible = inputs.saas.as_deref().and_then(|workbook| {
            match source.read_sheet_at(workbook, config.saas.eligible_sheet_index) {
                Ok(table) => {
                    let (eligible, found) = EligibleSales::from_table(&table, &config.saas, &config.regions);
                    diagnostics.extend(found);
                    Some(eligible)
                }
                Err(e) => {
                    warn!("Eligible sales sheet unavailable: {}", e);
                    diagnostics.push(Diagnostic::data_shape("eligible sales", e.to_string()));
                    None
                }
            }
        });

        let ledger = inputs
            .rebates
            .as_deref()
            .and_then(|workbook| self.load_ledger(source, workbook, diagnostics));

        let shared = SharedInputs {
            kept: filtered.kept,
            cross_region: filtered.cross_region,
            references,
            extract_columns,
            eligible,
            ledger,
        };
        Ok((shared, filtered.gate_counts))
    }

    fn load_ledger(
        &self,
        source: &dyn WorkbookSource,
        workbook: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<RebateLedger> {
        let rebate = &self.ctx.config.rebate;

        match source.read_sheet(workbook, &rebate.details_sheet) {
            Ok(details) => debug!("{} sheet: {} rows", rebate.details_sheet, details.len()),
            Err(e) => warn!("Could not read {}: {}", rebate.details_sheet, e),
        }

        match source.read_sheet(workbook, &rebate.summary_sheet) {
            Ok(table) => {
                info!("{} sheet: {} rows", rebate.summary_sheet, table.len());
                let (ledger, found) = RebateLedger::from_table(&table);
                diagnostics.extend(found);
                Some(ledger)
            }
            Err(e) => {
                warn!("Could not read {}: {}", rebate.summary_sheet, e);
                diagnostics.push(Diagnostic::data_shape("rebate summary", e.to_string()));
                None
            }
        }
    }

    fn load_calendar(&self, region: &RegionConfig, source: &dyn WorkbookSource) -> Result<ReportingCalendar> {
        let workbook = self
            .ctx
            .inputs
            .calendars
            .get(&region.code)
            .ok_or_else(|| FlashReportError::MissingWorkbook(format!("{} calendar", region.code)))?;
        let table = source.read_first_sheet(workbook)?;
        ReportingCalendar::from_table(&region.code, &table)
    }

    fn saas_coverage(
        &self,
        region: &RegionConfig,
        rules: &ReferenceRules,
        source: &dyn WorkbookSource,
        eligible: Option<&EligibleSales>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<String, SaasCoverage> {
        let config = self.ctx.config;
        let (Some(workbook), Some(eligible)) = (self.ctx.inputs.saas.as_deref(), eligible) else {
            return BTreeMap::new();
        };
        let Some(directory) = eligible.directory(&region.code) else {
            return BTreeMap::new();
        };

        let table = match source.read_sheet_at(workbook, region.saas_sheet_index) {
            Ok(table) => table,
            Err(e) => {
                warn!("{} as-a-service sheet unavailable: {}", region.code, e);
                diagnostics.push(Diagnostic::data_shape(
                    format!("{} as-a-service ledger", region.code),
                    e.to_string(),
                ));
                return BTreeMap::new();
            }
        };

        match saas_records_from_table(region, &table, &config.saas) {
            Ok(records) => coverage_by_partner(&records, eligible, directory, rules),
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                BTreeMap::new()
            }
        }
    }

    fn run_region(
        &self,
        region: &RegionConfig,
        shared: &SharedInputs,
        source: &dyn WorkbookSource,
        sink: &mut dyn WorkbookSink,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<RegionOutcome> {
        let ctx = self.ctx;
        let config = ctx.config;
        info!("Processing region {} ({})", region.code, region.currency);

        let calendar = self.load_calendar(region, source)?;
        let days_of_reporting = calendar.days_of_reporting(ctx.run_date)?;
        let days_in_quarter = calendar.days_in_quarter();
        debug!(
            "{}: {} of {} reporting days elapsed",
            region.code, days_of_reporting, days_in_quarter
        );

        let rules = shared
            .references
            .get(&region.code)
            .ok_or_else(|| FlashReportError::MissingWorkbook(format!("{} reference", region.code)))?;
        let classified = classify_all(&shared.kept, rules, &config.classification, region.currency);

        let builder = ReportBuilder::new(
            region.currency,
            ctx.quarter,
            config.classification.oem_exclusion_level.as_str(),
        );
        let pops = builder.populations(&classified, &shared.cross_region, None);
        let (report, found) = builder.build(&pops, &region.code);
        diagnostics.extend(found);

        let region_report = RegionReport {
            region: region.code.clone(),
            workbook: region.report_workbook.clone(),
            sheet: region.report_sheet.clone(),
            program_summary: report.program_summary(),
            report,
        };
        sink.write_workbook(&region_report.workbook, region_report.to_sheets())?;
        info!(
            "{}: wrote {} with {} scheme rows",
            region.code,
            region_report.workbook,
            region_report.report.rows.len()
        );

        let saas = self.saas_coverage(region, rules, source, shared.eligible.as_ref(), diagnostics);
        let rebates = shared
            .ledger
            .as_ref()
            .map(|ledger| ledger.scheme_totals(region, &config.rebate))
            .unwrap_or_default();

        let state = RegionState {
            region,
            builder,
            allocation: AllocationContext {
                incentive_name: region.incentive_name.clone(),
                start_date: ctx.quarter.start_date()?,
                end_date: ctx.quarter.end_date()?,
                days_of_reporting,
                days_in_quarter,
            },
            cross_region: &shared.cross_region,
            saas,
            rebates,
            directory: shared.eligible.as_ref().and_then(|e| e.directory(&region.code)),
            extract_columns: shared.extract_columns,
            classified,
        };

        let partners = partner_ids(&state.classified);
        info!("{}: {} distributor partners", region.code, partners.len());

        let mut outcomes = Vec::with_capacity(partners.len());
        for partner in partners {
            let outcome = match self.run_partner(&state, &partner, sink, diagnostics) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("{} partner {} failed: {}", region.code, partner, e);
                    PartnerOutcome {
                        partner_id: partner.clone(),
                        status: OutcomeStatus::Failed(e.to_string()),
                        report: None,
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(RegionOutcome {
            region: region.code.clone(),
            status: OutcomeStatus::Written,
            report: Some(region_report),
            partners: outcomes,
        })
    }

    fn run_partner(
        &self,
        state: &RegionState<'_>,
        partner: &str,
        sink: &mut dyn WorkbookSink,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<PartnerOutcome> {
        let config = self.ctx.config;
        let region = state.region;
        let context = format!("{} partner {}", region.code, partner);

        let pops = state
            .builder
            .populations(&state.classified, state.cross_region, Some(partner));
        if pops.is_empty() {
            debug!("{}: no sales in the reporting quarter, skipped", context);
            return Ok(PartnerOutcome {
                partner_id: partner.to_string(),
                status: OutcomeStatus::Skipped("no sales in the reporting quarter".to_string()),
                report: None,
            });
        }

        let (mut report, found) = state.builder.build(&pops, &context);
        diagnostics.extend(found);

        let program_summary = report.program_summary();
        let mut summary = allocate(&program_summary, &config.rebate, &state.allocation);

        if let Some(row) = state
            .saas
            .get(partner)
            .and_then(|coverage| coverage_row(coverage, report.months.len(), &config.saas))
        {
            debug!(
                "{}: appended as-a-service coverage PG {:.2}, SBP {:.2}",
                context, row.totals.pg_coverage, row.totals.sbp_coverage
            );
            report.rows.push(row);
        }

        let partner_rebates: Vec<SchemeRebate> = state
            .rebates
            .iter()
            .filter(|r| r.party_id == partner)
            .cloned()
            .collect();
        let mut summary2 = ledger_rows(
            &partner_rebates,
            &summary,
            &region.incentive_name,
            &config.rebate,
        );

        let company_name = state
            .directory
            .and_then(|d| d.company_name(partner))
            .map(str::to_string);
        if let Some(name) = &company_name {
            apply_company_name(&mut summary, name);
            apply_company_name(&mut summary2, name);
        }

        let exclusions: Vec<ExclusionDetail> = pops
            .excluded_in_family
            .iter()
            .map(|r| ExclusionDetail::from_record(r, region.currency))
            .collect();

        let wants_extracts = region.auxiliary_partners.iter().any(|p| p == partner);
        let extracts: Option<Vec<ExtractRow>> = if state.extract_columns && wants_extracts {
            Some(pops.inclusive.iter().map(|r| ExtractRow::from_record(r)).collect())
        } else {
            None
        };

        let partner_report = PartnerReport {
            region: region.code.clone(),
            partner_id: partner.to_string(),
            workbook: region.partner_workbook(partner),
            currency: region.currency,
            company_name,
            program_summary,
            report,
            summary,
            summary2,
            exclusions,
            extracts,
        };
        sink.write_workbook(&partner_report.workbook, partner_report.to_sheets())?;
        debug!("{}: wrote {}", context, partner_report.workbook);

        Ok(PartnerOutcome {
            partner_id: partner.to_string(),
            status: OutcomeStatus::Written,
            report: Some(partner_report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CellValue, MemoryWorkbook, Table};

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 15).unwrap()
    }

    fn source(config: &FlashReportConfig) -> MemoryWorkbook {
        let mut calendar = Table::new(["Date", "Days of Reporting"]);
        calendar.push_row(vec![CellValue::Date(run_date()), CellValue::Number(30.0)]);

        let mut source = MemoryWorkbook::new()
            .with_sheet("tx", "Data", Table::new(config.required_main_fields.clone()));
        for region in &config.regions {
            source.insert_sheet(
                &format!("ref_{}", region.code),
                "Reference",
                Table::new(config.required_reference_fields.clone()),
            );
            source.insert_sheet(&format!("cal_{}", region.code), "Calendar", calendar.clone());
        }
        source
    }

    fn inputs(config: &FlashReportConfig) -> RunInputs {
        RunInputs {
            transactions: "tx".to_string(),
            references: config
                .regions
                .iter()
                .map(|r| (r.code.clone(), format!("ref_{}", r.code)))
                .collect(),
            calendars: config
                .regions
                .iter()
                .map(|r| (r.code.clone(), format!("cal_{}", r.code)))
                .collect(),
            saas: None,
            rebates: None,
        }
    }

    #[test]
    fn test_empty_extract_writes_empty_region_reports() {
        let config = FlashReportConfig::default();
        let ctx = RunContext::new(&config, run_date(), inputs(&config));
        let mut sink = MemoryWorkbook::new();

        let result = FlashReportPipeline::new(&ctx).run(&source(&config), &mut sink).unwrap();

        assert_eq!(result.regions.len(), 2);
        for region in &result.regions {
            assert!(region.status.is_written());
            assert!(region.partners.is_empty());
            assert!(region.report.as_ref().unwrap().report.rows.is_empty());
        }
        assert!(sink.workbook("Final_Report_USD_US").is_some());
        assert!(sink.workbook("Final_Report_Canada_CA").is_some());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DataShape { .. })));
    }

    #[test]
    fn test_missing_reference_workbook_aborts_run() {
        let config = FlashReportConfig::default();
        let mut inputs = inputs(&config);
        inputs.references.remove("CA");
        let ctx = RunContext::new(&config, run_date(), inputs);
        let mut sink = MemoryWorkbook::new();

        let result = FlashReportPipeline::new(&ctx).run(&source(&config), &mut sink);
        assert!(matches!(result, Err(FlashReportError::MissingWorkbook(_))));
        assert_eq!(sink.workbook_names().count(), 0);
    }

    #[test]
    fn test_missing_calendar_date_fails_region() {
        let config = FlashReportConfig::default();
        let ctx = RunContext::new(&config, NaiveDate::from_ymd_opt(2025, 9, 16).unwrap(), inputs(&config));
        let mut sink = MemoryWorkbook::new();

        let result = FlashReportPipeline::new(&ctx).run(&source(&config), &mut sink).unwrap();
        for region in &result.regions {
            assert!(matches!(region.status, OutcomeStatus::Failed(_)));
        }
        assert_eq!(sink.workbook_names().count(), 0);
    }
}
