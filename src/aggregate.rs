//! Scheme x product-line report tables.
//!
//! A report is built from several populations of classified records, all
//! restricted to the reporting quarter:
//!
//! - **inclusive**: records with a scheme and a product family. Drives the
//!   monthly list-price columns and includes deal-excluded and
//!   reseller-excluded records.
//! - **filtered**: the inclusive population without deal-excluded records.
//!   Drives upfront and backend. Reseller-excluded records stay in, so their
//!   discounts come off net sales out before their net is subtracted as an
//!   exclusion.
//! - **exclusions**: records with a business unit and an exclusion level.
//! - **coverage**: records with a business unit and no exclusion level,
//!   split into PG and SBP.
//! - **cross-region**: the alternate-reporting-type side channel.

use crate::calendar::FiscalQuarter;
use crate::error::Diagnostic;
use crate::schema::{ClassifiedRecord, Coverage, Currency, FiscalMonth, TransactionRecord};
use crate::utils::{round2, sum_present};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemeTotals {
    pub total_sales: f64,
    pub upfront: f64,
    pub backend: f64,
    pub net_sales_out: f64,
    pub other_exclusions: f64,
    pub oem_exclusions: f64,
    pub cross_region_sales: f64,
    pub total_exclusions: f64,
    pub eligible_net: f64,
    pub pg_coverage: f64,
    pub sbp_coverage: f64,
}

impl SchemeTotals {
    pub fn add(&mut self, other: &SchemeTotals) {
        self.total_sales += other.total_sales;
        self.upfront += other.upfront;
        self.backend += other.backend;
        self.net_sales_out += other.net_sales_out;
        self.other_exclusions += other.other_exclusions;
        self.oem_exclusions += other.oem_exclusions;
        self.cross_region_sales += other.cross_region_sales;
        self.total_exclusions += other.total_exclusions;
        self.eligible_net += other.eligible_net;
        self.pg_coverage += other.pg_coverage;
        self.sbp_coverage += other.sbp_coverage;
    }

    pub fn rounded(&self) -> Self {
        Self {
            total_sales: round2(self.total_sales),
            upfront: round2(self.upfront),
            backend: round2(self.backend),
            net_sales_out: round2(self.net_sales_out),
            other_exclusions: round2(self.other_exclusions),
            oem_exclusions: round2(self.oem_exclusions),
            cross_region_sales: round2(self.cross_region_sales),
            total_exclusions: round2(self.total_exclusions),
            eligible_net: round2(self.eligible_net),
            pg_coverage: round2(self.pg_coverage),
            sbp_coverage: round2(self.sbp_coverage),
        }
    }

    pub fn coverage(&self, coverage: Coverage) -> f64 {
        match coverage {
            Coverage::Pg => self.pg_coverage,
            Coverage::Sbp => self.sbp_coverage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeRow {
    pub program: String,
    pub product_line: String,
    /// List-price sales per month, aligned with [`SchemeReport::months`].
    pub monthly: Vec<f64>,
    pub totals: SchemeTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummaryRow {
    pub program: String,
    pub monthly: Vec<f64>,
    pub totals: SchemeTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemeReport {
    /// Months present in the inclusive population, chronological.
    pub months: Vec<FiscalMonth>,
    pub rows: Vec<SchemeRow>,
}

impl SchemeReport {
    /// "{Month}_NDP_sales" headers, one per month.
    pub fn month_columns(&self) -> Vec<String> {
        self.months
            .iter()
            .map(|m| format!("{}_NDP_sales", m.month_name()))
            .collect()
    }

    /// One row per program, summing every numeric column of its product lines.
    pub fn program_summary(&self) -> Vec<ProgramSummaryRow> {
        let mut grouped: BTreeMap<&str, ProgramSummaryRow> = BTreeMap::new();
        for row in &self.rows {
            let entry = grouped
                .entry(row.program.as_str())
                .or_insert_with(|| ProgramSummaryRow {
                    program: row.program.clone(),
                    monthly: vec![0.0; self.months.len()],
                    totals: SchemeTotals::default(),
                });
            for (sum, value) in entry.monthly.iter_mut().zip(&row.monthly) {
                *sum += value;
            }
            entry.totals.add(&row.totals);
        }

        grouped
            .into_values()
            .map(|mut row| {
                row.monthly.iter_mut().for_each(|v| *v = round2(*v));
                row.totals = row.totals.rounded();
                row
            })
            .collect()
    }

    pub fn programs(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.program.as_str()).collect()
    }
}

/// Indexes `rows` by key, keeping the first row of any duplicated key. The
/// number of dropped rows is logged and returned as a diagnostic.
pub fn index_unique<K: Ord, V>(
    rows: Vec<(K, V)>,
    context: &str,
) -> (BTreeMap<K, V>, Option<Diagnostic>) {
    let total = rows.len();
    let mut indexed = BTreeMap::new();
    for (key, value) in rows {
        indexed.entry(key).or_insert(value);
    }

    let removed = total - indexed.len();
    if removed == 0 {
        return (indexed, None);
    }

    warn!("{}: removed {} duplicate key row(s) before merging", context, removed);
    let diagnostic = Diagnostic::data_shape(
        context,
        format!("removed {removed} duplicate key row(s) before merging"),
    );
    (indexed, Some(diagnostic))
}

fn group_sum<'r, K: Ord>(
    records: impl IntoIterator<Item = &'r ClassifiedRecord>,
    key: impl Fn(&ClassifiedRecord) -> K,
    value: impl Fn(&ClassifiedRecord) -> Option<f64>,
) -> Vec<(K, f64)> {
    let mut sums: BTreeMap<K, f64> = BTreeMap::new();
    for record in records {
        *sums.entry(key(record)).or_default() += value(record).unwrap_or(0.0);
    }
    sums.into_iter().collect()
}

/// The record subsets one report is built from.
#[derive(Debug, Clone, Default)]
pub struct Populations<'a> {
    pub inclusive: Vec<&'a ClassifiedRecord>,
    pub filtered: Vec<&'a ClassifiedRecord>,
    pub exclusions: Vec<&'a ClassifiedRecord>,
    pub coverage: Vec<&'a ClassifiedRecord>,
    pub cross_region: Vec<&'a TransactionRecord>,
    /// Excluded records inside a product family, for the exclusions extract.
    pub excluded_in_family: Vec<&'a ClassifiedRecord>,
}

impl Populations<'_> {
    pub fn is_empty(&self) -> bool {
        self.inclusive.is_empty()
    }
}

pub struct ReportBuilder {
    currency: Currency,
    quarter: FiscalQuarter,
    oem_level: String,
}

impl ReportBuilder {
    pub fn new(currency: Currency, quarter: FiscalQuarter, oem_level: impl Into<String>) -> Self {
        Self {
            currency,
            quarter,
            oem_level: oem_level.into(),
        }
    }

    pub fn quarter(&self) -> FiscalQuarter {
        self.quarter
    }

    fn in_quarter(&self, record: &TransactionRecord) -> bool {
        record
            .fiscal_month
            .is_some_and(|month| self.quarter.contains(month))
    }

    /// Splits records into populations. With `partner`, only that distributor
    /// partner's records (and cross-region sales through that distributor)
    /// are kept.
    pub fn populations<'a>(
        &self,
        records: &'a [ClassifiedRecord],
        cross_region: &'a [Rc<TransactionRecord>],
        partner: Option<&str>,
    ) -> Populations<'a> {
        let mut pops = Populations::default();

        for record in records {
            if !self.in_quarter(&record.record) {
                continue;
            }
            if partner.is_some() && record.partner.as_deref() != partner {
                continue;
            }

            let in_family = !record.scheme.is_empty() && record.family.is_some();
            if in_family {
                pops.inclusive.push(record);
                if !record.deal_excluded {
                    pops.filtered.push(record);
                }
                if record.is_excluded() {
                    pops.excluded_in_family.push(record);
                }
            }

            if record.business_unit.is_some() {
                if record.is_excluded() {
                    pops.exclusions.push(record);
                } else {
                    pops.coverage.push(record);
                }
            }
        }

        pops.cross_region = cross_region
            .iter()
            .map(Rc::as_ref)
            .filter(|r| self.in_quarter(r))
            .filter(|r| partner.is_none() || r.distributor_id.as_deref() == partner)
            .collect();

        debug!(
            "Populations: inclusive {}, filtered {}, exclusions {}, coverage {}, cross-region {}",
            pops.inclusive.len(),
            pops.filtered.len(),
            pops.exclusions.len(),
            pops.coverage.len(),
            pops.cross_region.len()
        );

        pops
    }

    /// Builds the scheme x product-line table. Monetary values are rounded to
    /// two decimals as each block of columns is merged in.
    ///
    /// Every column, exclusions and cross-region sales included, only sees
    /// records from the reporting quarter. Exclusions from earlier quarters
    /// are never netted against this quarter's sales.
    pub fn build(&self, pops: &Populations<'_>, context: &str) -> (SchemeReport, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let currency = self.currency;

        if pops.inclusive.is_empty() {
            let diagnostic = Diagnostic::data_shape(context, "no sales in the reporting quarter");
            warn!("{}", diagnostic);
            diagnostics.push(diagnostic);
        }

        let months: Vec<FiscalMonth> = pops
            .inclusive
            .iter()
            .filter_map(|r| r.record.fiscal_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let month_slot: BTreeMap<FiscalMonth, usize> =
            months.iter().enumerate().map(|(i, m)| (*m, i)).collect();

        // Monthly list-price pivot.
        let mut pivot: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for record in &pops.inclusive {
            let Some(slot) = record.record.fiscal_month.and_then(|m| month_slot.get(&m)) else {
                continue;
            };
            let key = (record.scheme.clone(), record.product_line().to_string());
            let monthly = pivot.entry(key).or_insert_with(|| vec![0.0; months.len()]);
            monthly[*slot] += record.record.amounts(currency).list_price.unwrap_or(0.0);
        }

        // Upfront and backend over the filtered population.
        let upfront_rows = group_sum(
            pops.filtered.iter().copied(),
            |r| (r.scheme.clone(), r.product_line().to_string()),
            |r| r.reconciliation.updated_upfront,
        );
        let backend_rows = group_sum(
            pops.filtered.iter().copied(),
            |r| (r.scheme.clone(), r.product_line().to_string()),
            |r| r.record.amounts(currency).backend,
        );
        let (upfront_by_key, dup_upfront) = index_unique(upfront_rows, &format!("{context} upfront"));
        let (backend_by_key, dup_backend) = index_unique(backend_rows, &format!("{context} backend"));
        diagnostics.extend(dup_upfront);
        diagnostics.extend(dup_backend);

        // Exclusion columns, keyed by product line.
        let oem_level = self.oem_level.as_str();
        let other_rows = group_sum(
            pops.exclusions
                .iter()
                .copied()
                .filter(|r| r.exclusion_level.as_deref() != Some(oem_level)),
            |r| r.product_line().to_string(),
            |r| r.net(currency),
        );
        let oem_rows = group_sum(
            pops.exclusions
                .iter()
                .copied()
                .filter(|r| r.exclusion_level.as_deref() == Some(oem_level)),
            |r| r.product_line().to_string(),
            |r| r.net(currency),
        );
        let (other_exclusions, dup_other) = index_unique(other_rows, &format!("{context} other exclusions"));
        let (oem_exclusions, dup_oem) = index_unique(oem_rows, &format!("{context} OEM exclusions"));
        diagnostics.extend(dup_other);
        diagnostics.extend(dup_oem);

        let cross_region = self.cross_region_by_product_line(&pops.cross_region);

        let pg_rows = group_sum(
            pops.coverage.iter().copied().filter(|r| r.coverage == Coverage::Pg),
            |r| r.product_line().to_string(),
            |r| r.net(currency),
        );
        let sbp_rows = group_sum(
            pops.coverage.iter().copied().filter(|r| r.coverage == Coverage::Sbp),
            |r| r.product_line().to_string(),
            |r| r.net(currency),
        );
        let (pg_coverage, dup_pg) = index_unique(pg_rows, &format!("{context} PG coverage"));
        let (sbp_coverage, dup_sbp) = index_unique(sbp_rows, &format!("{context} SBP coverage"));
        diagnostics.extend(dup_pg);
        diagnostics.extend(dup_sbp);

        let lookup = |map: &BTreeMap<String, f64>, pl: &str| round2(map.get(pl).copied().unwrap_or(0.0));

        let rows: Vec<SchemeRow> = pivot
            .into_iter()
            .map(|((program, product_line), monthly)| {
                let monthly: Vec<f64> = monthly.into_iter().map(round2).collect();
                let key = (program.clone(), product_line.clone());

                let total_sales = round2(monthly.iter().sum());
                let upfront = round2(upfront_by_key.get(&key).copied().unwrap_or(0.0));
                let backend = round2(backend_by_key.get(&key).copied().unwrap_or(0.0));
                let net_sales_out = round2(total_sales - (upfront + backend));

                let other = lookup(&other_exclusions, &product_line);
                let oem = lookup(&oem_exclusions, &product_line);
                let cross = lookup(&cross_region, &product_line);
                let total_exclusions = round2(other + oem + cross);

                SchemeRow {
                    totals: SchemeTotals {
                        total_sales,
                        upfront,
                        backend,
                        net_sales_out,
                        other_exclusions: other,
                        oem_exclusions: oem,
                        cross_region_sales: cross,
                        total_exclusions,
                        eligible_net: net_sales_out - total_exclusions,
                        pg_coverage: lookup(&pg_coverage, &product_line),
                        sbp_coverage: lookup(&sbp_coverage, &product_line),
                    },
                    program,
                    product_line,
                    monthly,
                }
            })
            .collect();

        debug!("{}: {} scheme rows over {} months", context, rows.len(), months.len());

        (SchemeReport { months, rows }, diagnostics)
    }

    /// Net cross-region sales per product line, summed from per-distributor totals.
    fn cross_region_by_product_line(&self, records: &[&TransactionRecord]) -> BTreeMap<String, f64> {
        let mut by_distributor: BTreeMap<(String, String), Vec<Option<f64>>> = BTreeMap::new();
        for record in records {
            by_distributor
                .entry((
                    record.product_line().to_string(),
                    record.distributor_id.clone().unwrap_or_default(),
                ))
                .or_default()
                .push(record.amounts(self.currency).net);
        }

        let mut by_product_line: BTreeMap<String, f64> = BTreeMap::new();
        for ((product_line, _), nets) in by_distributor {
            *by_product_line.entry(product_line).or_default() += sum_present(nets);
        }
        by_product_line
    }
}

/// Distinct distributor partners with mapped business, in id order.
pub fn partner_ids(records: &[ClassifiedRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.business_unit.is_some())
        .filter_map(|r| r.partner.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_all;
    use crate::config::ClassificationConfig;
    use crate::schema::{Amounts, DataType, ReferenceRow, ReferenceRules};

    fn quarter() -> FiscalQuarter {
        FiscalQuarter::from_month(2025, 8)
    }

    fn record(pl: &str, month: i64, reseller: &str, lp: f64, up: f64, be: f64, net: f64) -> TransactionRecord {
        TransactionRecord {
            source_system: Some(2032),
            product_line: Some(pl.to_string()),
            reseller_id: Some(reseller.to_string()),
            distributor_id: Some("900".to_string()),
            fiscal_month: FiscalMonth::from_yyyymm(month).ok(),
            data_type: Some(DataType::DirectSale),
            usd: Amounts {
                list_price: Some(lp),
                upfront: Some(up),
                backend: Some(be),
                net: Some(net),
            },
            ..Default::default()
        }
    }

    fn rules() -> ReferenceRules {
        let rows = vec![
            ReferenceRow {
                product_line: Some("AB".to_string()),
                business_unit: Some("Compute".to_string()),
                program_type: Some("Standard".to_string()),
                exclusion_party_id: Some("66".to_string()),
                exclusion_level: Some("OEM".to_string()),
                pg_eligible_party_id: Some("10".to_string()),
                location_id: Some("900".to_string()),
                eligible_deal: Some("D1".to_string()),
                ..Default::default()
            },
            ReferenceRow {
                product_line: Some("CD".to_string()),
                business_unit: Some("Compute".to_string()),
                program_type: Some("Standard".to_string()),
                exclusion_party_id: Some("77".to_string()),
                exclusion_level: Some("Gov".to_string()),
                ..Default::default()
            },
        ];
        ReferenceRules::from_rows(&rows, &["NA".to_string()])
    }

    fn classified(records: Vec<TransactionRecord>) -> Vec<ClassifiedRecord> {
        let records: Vec<Rc<TransactionRecord>> = records.into_iter().map(Rc::new).collect();
        classify_all(&records, &rules(), &ClassificationConfig::default(), Currency::Usd)
    }

    #[test]
    fn test_report_columns_and_identities() {
        let mut deal = record("AB", 202509, "10", 200.0, 10.0, 10.0, 180.0);
        deal.backend_deal = Some("D1".to_string());
        let records = classified(vec![
            record("AB", 202508, "10", 1000.0, 100.0, 50.0, 850.0),
            record("AB", 202509, "11", 500.0, 20.0, 30.0, 450.0),
            record("AB", 202509, "66", 300.0, 0.0, 0.0, 300.0),
            record("CD", 202510, "77", 400.0, 0.0, 0.0, 400.0),
            record("AB", 202504, "10", 999.0, 0.0, 0.0, 999.0),
            deal,
        ]);
        let mut rcs = record("AB", 202508, "12", 60.0, 0.0, 0.0, 60.0);
        rcs.reporting_type = Some("RCS".to_string());
        let cross = vec![Rc::new(rcs)];

        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let pops = builder.populations(&records, &cross, None);
        let (report, diagnostics) = builder.build(&pops, "US");
        assert!(diagnostics.is_empty());

        assert_eq!(
            report.month_columns(),
            vec!["August_NDP_sales", "September_NDP_sales", "October_NDP_sales"]
        );
        assert_eq!(report.rows.len(), 2);

        let ab = &report.rows[0];
        assert_eq!(ab.program, "ComputeStandard");
        assert_eq!(ab.product_line, "AB");
        // Deal-excluded and OEM-excluded rows count towards monthly sales.
        assert_eq!(ab.monthly, vec![1000.0, 1000.0, 0.0]);
        assert!((ab.totals.total_sales - ab.monthly.iter().sum::<f64>()).abs() < 0.01);
        // The deal-excluded row stays out of upfront/backend.
        assert_eq!(ab.totals.upfront, 120.0);
        assert_eq!(ab.totals.backend, 80.0);
        assert_eq!(ab.totals.net_sales_out, 1800.0);
        assert_eq!(ab.totals.oem_exclusions, 300.0);
        assert_eq!(ab.totals.cross_region_sales, 60.0);
        assert_eq!(ab.totals.total_exclusions, 360.0);
        assert_eq!(
            ab.totals.eligible_net,
            ab.totals.net_sales_out - ab.totals.total_exclusions
        );
        assert_eq!(ab.totals.pg_coverage, 1030.0);
        assert_eq!(ab.totals.sbp_coverage, 450.0);

        let cd = &report.rows[1];
        assert_eq!(cd.totals.other_exclusions, 400.0);
        assert_eq!(cd.totals.upfront, 0.0);
    }

    #[test]
    fn test_excluded_reseller_discounts_reduce_net_sales_out() {
        let records = classified(vec![record("AB", 202508, "66", 300.0, 20.0, 30.0, 250.0)]);
        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let pops = builder.populations(&records, &[], None);
        assert_eq!(pops.filtered.len(), 1);
        assert_eq!(pops.excluded_in_family.len(), 1);

        let (report, _) = builder.build(&pops, "US");
        let t = &report.rows[0].totals;
        assert_eq!(t.total_sales, 300.0);
        assert_eq!(t.upfront, 20.0);
        assert_eq!(t.backend, 30.0);
        assert_eq!(t.net_sales_out, 250.0);
        assert_eq!(t.oem_exclusions, 250.0);
        assert!(t.eligible_net.abs() < 0.01);
    }

    #[test]
    fn test_exclusions_outside_the_quarter_are_ignored() {
        let records = classified(vec![
            record("AB", 202508, "10", 1000.0, 0.0, 0.0, 1000.0),
            record("AB", 202507, "66", 300.0, 0.0, 0.0, 300.0),
            record("CD", 202511, "77", 400.0, 0.0, 0.0, 400.0),
        ]);
        let mut rcs = record("AB", 202505, "12", 60.0, 0.0, 0.0, 60.0);
        rcs.reporting_type = Some("RCS".to_string());
        let cross = vec![Rc::new(rcs)];

        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let pops = builder.populations(&records, &cross, None);
        assert!(pops.exclusions.is_empty());
        assert!(pops.cross_region.is_empty());

        let (report, _) = builder.build(&pops, "US");
        assert_eq!(report.rows.len(), 1);
        let t = &report.rows[0].totals;
        assert_eq!(t.total_exclusions, 0.0);
        assert_eq!(t.eligible_net, 1000.0);
    }

    #[test]
    fn test_program_summary_sums_product_lines() {
        let records = classified(vec![
            record("AB", 202508, "10", 1000.0, 100.0, 50.0, 850.0),
            record("CD", 202509, "11", 500.0, 20.0, 30.0, 450.0),
        ]);
        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let pops = builder.populations(&records, &[], None);
        let (report, _) = builder.build(&pops, "US");

        let summary = report.program_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].program, "ComputeStandard");
        assert_eq!(summary[0].monthly, vec![1000.0, 500.0]);
        assert!((summary[0].totals.total_sales - 1500.0).abs() < 0.01);
        assert!((summary[0].totals.net_sales_out - 1300.0).abs() < 0.01);
    }

    #[test]
    fn test_partner_scope() {
        let mut other_partner = record("AB", 202508, "10", 700.0, 0.0, 0.0, 700.0);
        other_partner.distributor_id = Some("901".to_string());
        let records = classified(vec![
            record("AB", 202508, "10", 1000.0, 100.0, 50.0, 850.0),
            other_partner,
        ]);

        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let region = builder.populations(&records, &[], None);
        assert_eq!(region.inclusive.len(), 2);

        let partner = builder.populations(&records, &[], Some("900"));
        assert_eq!(partner.inclusive.len(), 1);
        assert_eq!(partner_ids(&records), vec!["900".to_string()]);
    }

    #[test]
    fn test_empty_population_is_reported() {
        let builder = ReportBuilder::new(Currency::Usd, quarter(), "OEM");
        let pops = builder.populations(&[], &[], None);
        let (report, diagnostics) = builder.build(&pops, "CA");
        assert!(report.rows.is_empty());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_index_unique_keeps_first() {
        let rows = vec![("a", 1.0), ("b", 2.0), ("a", 3.0)];
        let (indexed, diagnostic) = index_unique(rows, "merge");
        assert_eq!(indexed.get("a"), Some(&1.0));
        assert_eq!(indexed.len(), 2);
        assert!(matches!(diagnostic, Some(Diagnostic::DataShape { .. })));

        let (_, none) = index_unique(vec![("a", 1.0)], "merge");
        assert!(none.is_none());
    }
}
