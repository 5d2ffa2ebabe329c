//! Rebate allocation.
//!
//! Coverage sales from a partner's program summary are priced through the
//! program rate table ("Summary" rows). Rebates already computed upstream come
//! from the external rebate ledger and are laid out the same way ("Summary2"
//! rows).

use crate::aggregate::ProgramSummaryRow;
use crate::config::{RebateConfig, RegionConfig};
use crate::error::Diagnostic;
use crate::ingestion::id_text;
use crate::schema::Coverage;
use crate::table::{CellValue, Table};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a partner summary sheet. `None` renders as a blank cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub incentive_name: String,
    pub new_name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub amount: f64,
    pub company_name: String,
    /// A rate for coverage rows; a fixed dollar value for ledger rows.
    pub program_percent: Option<f64>,
    pub days_of_reporting: u32,
    pub days_in_quarter: u32,
    pub program_goal: Option<f64>,
    pub sbp_sdi: Option<f64>,
    pub project_attainment: Option<f64>,
    pub net_qtd_performance: f64,
    pub net_projected_performance: Option<f64>,
    pub adjusted_amount: Option<f64>,
    pub total_rebate_amount: f64,
    pub projected_rebate_amount: Option<f64>,
    pub comments: String,
}

impl AllocationRow {
    /// The single row written for a partner without any program.
    pub fn placeholder(incentive_name: &str) -> Self {
        Self {
            incentive_name: incentive_name.to_string(),
            new_name: String::new(),
            start_date: None,
            end_date: None,
            amount: 0.0,
            company_name: String::new(),
            program_percent: Some(0.0),
            days_of_reporting: 0,
            days_in_quarter: 0,
            program_goal: Some(0.0),
            sbp_sdi: Some(0.0),
            project_attainment: Some(0.0),
            net_qtd_performance: 0.0,
            net_projected_performance: Some(0.0),
            adjusted_amount: Some(0.0),
            total_rebate_amount: 0.0,
            projected_rebate_amount: Some(0.0),
            comments: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.new_name.is_empty()
    }
}

/// Period and company details shared by every row of one partner summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationContext {
    pub incentive_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_of_reporting: u32,
    pub days_in_quarter: u32,
}

/// Straight-line projection to the end of the quarter. Blank when no
/// reporting days have elapsed.
pub fn project(value: f64, days_of_reporting: u32, days_in_quarter: u32) -> Option<f64> {
    if days_of_reporting == 0 {
        return None;
    }
    Some(value / days_of_reporting as f64 * days_in_quarter as f64)
}

/// One PG and one SBP row per program. Programs without a rate get a zero
/// rate and a zero amount.
pub fn allocate(
    summary: &[ProgramSummaryRow],
    config: &RebateConfig,
    ctx: &AllocationContext,
) -> Vec<AllocationRow> {
    let mut rows = Vec::with_capacity(summary.len() * 2);

    for program in summary.iter().filter(|p| !p.program.trim().is_empty()) {
        for coverage in Coverage::all() {
            let key = format!("{}_{}", program.program, coverage);
            let rate = config.rate_for(&key);
            let sales = program.totals.coverage(coverage);
            let amount = sales * rate;
            debug!(
                "Allocation {}: rate {}, coverage sales {:.2}, amount {:.2}",
                key, rate, sales, amount
            );

            rows.push(AllocationRow {
                incentive_name: ctx.incentive_name.clone(),
                new_name: key,
                start_date: Some(ctx.start_date),
                end_date: Some(ctx.end_date),
                amount,
                company_name: String::new(),
                program_percent: Some(rate),
                days_of_reporting: ctx.days_of_reporting,
                days_in_quarter: ctx.days_in_quarter,
                program_goal: Some(0.0),
                sbp_sdi: Some(0.0),
                project_attainment: Some(0.0),
                net_qtd_performance: sales,
                net_projected_performance: project(sales, ctx.days_of_reporting, ctx.days_in_quarter),
                adjusted_amount: Some(0.0),
                total_rebate_amount: amount,
                projected_rebate_amount: project(amount, ctx.days_of_reporting, ctx.days_in_quarter),
                comments: String::new(),
            });
        }
    }

    if rows.is_empty() {
        rows.push(AllocationRow::placeholder(&ctx.incentive_name));
    }

    rows
}

pub fn apply_company_name(rows: &mut [AllocationRow], company_name: &str) {
    for row in rows {
        row.company_name = company_name.to_string();
    }
}

// ---------------------------------------------------------------------------
// External rebate ledger
// ---------------------------------------------------------------------------

const COUNTRY: &str = "COUNTRY";
const PARTNER_TYPE: &str = "PARTNER_TYPE";
const PARTY_ID: &str = "PARTY_ID";
const SCHEME: &str = "SCHEME";
const FINAL_REBATE: &str = "FINAL_REBATE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebateLedgerEntry {
    pub country: Option<String>,
    pub partner_type: Option<String>,
    pub party_id: Option<String>,
    pub scheme: Option<String>,
    pub final_rebate: Option<f64>,
    /// Every text cell of the row, for the exclusion patterns.
    pub text_cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeRebate {
    pub party_id: String,
    pub scheme: String,
    pub final_rebate: f64,
}

/// The rebate summary sheet, read once and filtered per region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebateLedger {
    pub entries: Vec<RebateLedgerEntry>,
    pub has_country: bool,
    pub has_partner_type: bool,
}

impl RebateLedger {
    /// A sheet without party id, scheme or final rebate yields an empty
    /// ledger and a diagnostic.
    pub fn from_table(table: &Table) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();

        let missing: Vec<&str> = [PARTY_ID, SCHEME, FINAL_REBATE]
            .into_iter()
            .filter(|c| !table.has_column(c))
            .collect();
        if !missing.is_empty() {
            let diagnostic = Diagnostic::data_shape(
                "rebate summary",
                format!("missing required columns {:?}; no ledger rebates", missing),
            );
            warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
            return (Self::default(), diagnostics);
        }

        let text = |row: usize, column: &str| table.value(row, column).and_then(CellValue::as_text);

        let mut entries = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let final_rebate = match table.value(row, FINAL_REBATE) {
                Some(cell) if !cell.is_blank() => {
                    let value = cell.as_f64();
                    if value.is_none() {
                        diagnostics.push(Diagnostic::NumericCoercion {
                            dataset: "rebate summary".to_string(),
                            column: FINAL_REBATE.to_string(),
                            row,
                            value: cell.to_string(),
                        });
                    }
                    value
                }
                _ => None,
            };

            let text_cells = table
                .rows
                .get(row)
                .map(|cells| {
                    cells
                        .iter()
                        .filter_map(|c| match c {
                            CellValue::Text(s) => Some(s.clone()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();

            entries.push(RebateLedgerEntry {
                country: text(row, COUNTRY),
                partner_type: text(row, PARTNER_TYPE),
                party_id: table.value(row, PARTY_ID).and_then(id_text),
                scheme: text(row, SCHEME),
                final_rebate,
                text_cells,
            });
        }

        if !table.has_column(COUNTRY) {
            let diagnostic = Diagnostic::data_shape(
                "rebate summary",
                "COUNTRY column not found; no rows match any region",
            );
            warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
        }

        let ledger = Self {
            entries,
            has_country: table.has_column(COUNTRY),
            has_partner_type: table.has_column(PARTNER_TYPE),
        };
        (ledger, diagnostics)
    }

    fn is_region_row(entry: &RebateLedgerEntry, region: &RegionConfig) -> bool {
        entry.country.as_deref().is_some_and(|country| {
            let country = country.to_uppercase();
            region
                .rebate_country_codes
                .iter()
                .any(|code| code.to_uppercase() == country)
        })
    }

    fn has_excluded_text(entry: &RebateLedgerEntry, config: &RebateConfig) -> bool {
        let prefix = config.excluded_text_prefix.to_uppercase();
        let fragment = config.excluded_text_fragment.to_uppercase();
        entry.text_cells.iter().any(|cell| {
            let upper = cell.to_uppercase();
            upper.starts_with(&prefix) || upper.contains(&fragment)
        })
    }

    fn is_reported_scheme(scheme: &str, config: &RebateConfig) -> bool {
        let upper = scheme.to_uppercase();
        config
            .scheme_markers
            .iter()
            .any(|marker| upper.contains(&marker.to_uppercase()))
            || scheme.starts_with(&config.scheme_prefix)
    }

    /// Final rebate summed by (party id, scheme) for one region.
    pub fn scheme_totals(&self, region: &RegionConfig, config: &RebateConfig) -> Vec<SchemeRebate> {
        if !self.has_country {
            return Vec::new();
        }

        let mut rows: Vec<&RebateLedgerEntry> = self
            .entries
            .iter()
            .filter(|e| Self::is_region_row(e, region))
            .collect();
        debug!("{} rebate ledger: {} rows for the region", region.code, rows.len());

        if self.has_partner_type {
            rows.retain(|e| {
                e.partner_type
                    .as_deref()
                    .is_some_and(|t| t.to_uppercase() == config.partner_type.to_uppercase())
            });
            debug!("{} rebate ledger: {} distributor rows", region.code, rows.len());
        }

        rows.retain(|e| !Self::has_excluded_text(e, config));

        let mut totals: BTreeMap<(String, String), f64> = BTreeMap::new();
        for entry in rows {
            let (Some(party_id), Some(scheme)) = (&entry.party_id, &entry.scheme) else {
                continue;
            };
            if !Self::is_reported_scheme(scheme, config) {
                continue;
            }
            *totals
                .entry((party_id.clone(), scheme.clone()))
                .or_default() += entry.final_rebate.unwrap_or(0.0);
        }

        info!(
            "{} rebate ledger: {} party/scheme combinations",
            region.code,
            totals.len()
        );

        totals
            .into_iter()
            .map(|((party_id, scheme), final_rebate)| SchemeRebate {
                party_id,
                scheme,
                final_rebate,
            })
            .collect()
    }
}

/// Summary rows for a partner's ledger rebates. Period and day counts come
/// from the first row of the partner's allocation summary.
pub fn ledger_rows(
    rebates: &[SchemeRebate],
    summary: &[AllocationRow],
    incentive_name: &str,
    config: &RebateConfig,
) -> Vec<AllocationRow> {
    let first = summary.first();
    let start_date = first.and_then(|r| r.start_date);
    let end_date = first.and_then(|r| r.end_date);
    let days_of_reporting = first.map_or(0, |r| r.days_of_reporting);
    let days_in_quarter = first.map_or(0, |r| r.days_in_quarter);
    let projectable = days_of_reporting > 0 && days_in_quarter > 0;

    rebates
        .iter()
        .map(|rebate| {
            let projected = if projectable {
                project(rebate.final_rebate, days_of_reporting, days_in_quarter)
            } else {
                None
            };
            AllocationRow {
                incentive_name: incentive_name.to_string(),
                new_name: rebate.scheme.clone(),
                start_date,
                end_date,
                amount: rebate.final_rebate,
                company_name: String::new(),
                program_percent: config.expansion_values.get(&rebate.scheme).copied(),
                days_of_reporting,
                days_in_quarter,
                program_goal: None,
                sbp_sdi: None,
                project_attainment: None,
                net_qtd_performance: rebate.final_rebate,
                net_projected_performance: projected,
                adjusted_amount: None,
                total_rebate_amount: rebate.final_rebate,
                projected_rebate_amount: projected,
                comments: String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SchemeTotals;

    fn ctx(days_of_reporting: u32) -> AllocationContext {
        AllocationContext {
            incentive_name: "US FinBen".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            days_of_reporting,
            days_in_quarter: 64,
        }
    }

    fn program(name: &str, pg: f64, sbp: f64) -> ProgramSummaryRow {
        ProgramSummaryRow {
            program: name.to_string(),
            monthly: vec![],
            totals: SchemeTotals {
                pg_coverage: pg,
                sbp_coverage: sbp,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_allocation_rates() {
        let rows = allocate(
            &[program("ComputeStandard", 10000.0, 2000.0)],
            &RebateConfig::default(),
            &ctx(32),
        );
        assert_eq!(rows.len(), 2);

        let pg = &rows[0];
        assert_eq!(pg.new_name, "ComputeStandard_PG");
        assert_eq!(pg.program_percent, Some(0.005));
        assert!((pg.amount - 50.0).abs() < 0.01);
        assert!((pg.total_rebate_amount - 50.0).abs() < 0.01);
        assert!((pg.net_qtd_performance - 10000.0).abs() < 0.01);
        assert!((pg.net_projected_performance.unwrap() - 20000.0).abs() < 0.01);
        assert!((pg.projected_rebate_amount.unwrap() - 100.0).abs() < 0.01);

        let sbp = &rows[1];
        assert_eq!(sbp.new_name, "ComputeStandard_SBP");
        assert!((sbp.amount - 110.0).abs() < 0.01);
    }

    #[test]
    fn test_unmapped_program_gets_zero_rate() {
        let rows = allocate(
            &[program("WidgetsStandard", 5000.0, 0.0)],
            &RebateConfig::default(),
            &ctx(10),
        );
        assert_eq!(rows[0].program_percent, Some(0.0));
        assert_eq!(rows[0].amount, 0.0);
        assert!((rows[0].net_qtd_performance - 5000.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_reporting_days_leave_projections_blank() {
        let rows = allocate(
            &[program("ComputeFocus", 100.0, 100.0)],
            &RebateConfig::default(),
            &ctx(0),
        );
        assert!(rows.iter().all(|r| r.net_projected_performance.is_none()));
        assert!(rows.iter().all(|r| r.projected_rebate_amount.is_none()));
    }

    #[test]
    fn test_placeholder_for_partner_without_programs() {
        let rows = allocate(&[], &RebateConfig::default(), &ctx(10));
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_placeholder());
        assert_eq!(rows[0].incentive_name, "US FinBen");
        assert_eq!(rows[0].start_date, None);
        assert_eq!(rows[0].days_of_reporting, 0);
    }

    fn ledger_table() -> Table {
        let mut table = Table::new(["COUNTRY", "PARTNER_TYPE", "PARTY_ID", "SCHEME", "FINAL_REBATE", "NOTE"]);
        let rows: Vec<(&str, &str, f64, &str, f64, &str)> = vec![
            ("US", "Distributor", 900.0, "Compute Expansion L1", 100.0, "ok"),
            ("us", "DISTRIBUTOR", 900.0, "Compute Expansion L1", 50.0, "ok"),
            ("US", "DISTRIBUTOR", 900.0, "aaS Storage", 25.0, "ok"),
            ("US", "DISTRIBUTOR", 900.0, "AAS lowercase prefix", 5.0, "ok"),
            ("US", "DISTRIBUTOR", 900.0, "Base Program", 70.0, "ok"),
            ("US", "Reseller", 900.0, "Compute Expansion L2", 60.0, "ok"),
            ("US", "DISTRIBUTOR", 900.0, "Compute Expansion L2", 40.0, "Larkin account"),
            ("US", "DISTRIBUTOR", 900.0, "Compute Expansion L3", 30.0, "Black Ltd"),
            ("Canada", "DISTRIBUTOR", 901.0, "Storage Expansion L1", 80.0, "ok"),
        ];
        for (country, partner_type, party, scheme, rebate, note) in rows {
            table.push_row(vec![
                CellValue::text(country),
                CellValue::text(partner_type),
                CellValue::Number(party),
                CellValue::text(scheme),
                CellValue::Number(rebate),
                CellValue::text(note),
            ]);
        }
        table
    }

    #[test]
    fn test_ledger_filters_and_sums() {
        let (ledger, diagnostics) = RebateLedger::from_table(&ledger_table());
        assert!(diagnostics.is_empty());

        let us = ledger.scheme_totals(&RegionConfig::us(), &RebateConfig::default());
        assert_eq!(
            us,
            vec![
                SchemeRebate {
                    party_id: "900".to_string(),
                    scheme: "Compute Expansion L1".to_string(),
                    final_rebate: 150.0,
                },
                SchemeRebate {
                    party_id: "900".to_string(),
                    scheme: "aaS Storage".to_string(),
                    final_rebate: 25.0,
                },
            ]
        );

        let ca = ledger.scheme_totals(&RegionConfig::ca(), &RebateConfig::default());
        assert_eq!(ca.len(), 1);
        assert_eq!(ca[0].party_id, "901");
    }

    #[test]
    fn test_ledger_without_required_columns_is_empty() {
        let table = Table::new(["COUNTRY", "SCHEME"]);
        let (ledger, diagnostics) = RebateLedger::from_table(&table);
        assert!(ledger.entries.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_ledger_rows_copy_period_from_summary() {
        let config = RebateConfig::default();
        let summary = allocate(&[program("ComputeStandard", 1.0, 1.0)], &config, &ctx(32));
        let rebates = vec![
            SchemeRebate {
                party_id: "900".to_string(),
                scheme: "Compute Expansion L1".to_string(),
                final_rebate: 320.0,
            },
            SchemeRebate {
                party_id: "900".to_string(),
                scheme: "aaS Storage".to_string(),
                final_rebate: 10.0,
            },
        ];

        let rows = ledger_rows(&rebates, &summary, "US FinBen", &config);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].program_percent, Some(700.0));
        assert_eq!(rows[0].amount, 320.0);
        assert_eq!(rows[0].net_qtd_performance, 320.0);
        assert_eq!(rows[0].start_date, summary[0].start_date);
        assert!((rows[0].projected_rebate_amount.unwrap() - 640.0).abs() < 0.01);
        assert_eq!(rows[0].program_goal, None);
        assert_eq!(rows[1].program_percent, None);

        let placeholder = vec![AllocationRow::placeholder("US FinBen")];
        let rows = ledger_rows(&rebates, &placeholder, "US FinBen", &config);
        assert!(rows[0].net_projected_performance.is_none());
    }
}
