use crate::config::{ClassificationConfig, FilterConfig};
use crate::reconcile::reconcile;
use crate::schema::{
    ClassifiedRecord, Coverage, Currency, DataType, ProductFamily, ReferenceRules,
    TransactionRecord,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCount {
    pub gate: String,
    pub remaining: usize,
}

/// Records surviving the filter chain, plus the alternate-reporting-type
/// records set aside for cross-region exclusion.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<Rc<TransactionRecord>>,
    pub cross_region: Vec<Rc<TransactionRecord>>,
    pub gate_counts: Vec<GateCount>,
}

fn flag_is(value: &Option<String>, flag: &str) -> bool {
    value.as_deref().map(str::trim) == Some(flag)
}

/// Runs the five gates in order: source system, cross-sourced, BDE, MSP
/// transfer, alternate reporting type.
pub fn apply_filters(records: Vec<TransactionRecord>, config: &FilterConfig) -> FilterOutcome {
    let mut gate_counts = Vec::with_capacity(5);
    let mut record_gate = |gate: &str, remaining: usize| {
        info!("After {} filter: {} rows", gate, remaining);
        gate_counts.push(GateCount {
            gate: gate.to_string(),
            remaining,
        });
    };

    debug!("Filter chain input: {} rows", records.len());

    let records: Vec<TransactionRecord> = records
        .into_iter()
        .filter(|r| {
            r.source_system
                .is_some_and(|key| config.accepted_source_systems.contains(&key))
        })
        .collect();
    record_gate("source system", records.len());

    let records: Vec<TransactionRecord> = records
        .into_iter()
        .filter(|r| !flag_is(&r.cross_sourced, &config.cross_sourced_flag))
        .collect();
    record_gate("cross-sourced", records.len());

    let records: Vec<TransactionRecord> = records
        .into_iter()
        .filter(|r| !flag_is(&r.bde_flag, &config.bde_flag))
        .map(|mut r| {
            if r.bde_flag.is_none() {
                r.bde_flag = Some(config.bde_default.clone());
            }
            r
        })
        .collect();
    record_gate("BDE", records.len());

    let records: Vec<TransactionRecord> = records
        .into_iter()
        .filter(|r| !flag_is(&r.msp_flag, &config.msp_transfer_flag))
        .collect();
    record_gate("MSP", records.len());

    let (cross_region, kept): (Vec<_>, Vec<_>) = records
        .into_iter()
        .map(Rc::new)
        .partition(|r| flag_is(&r.reporting_type, &config.alternate_reporting_type));
    record_gate("reporting type", kept.len());
    info!(
        "{} {} rows set aside as cross-region sales",
        cross_region.len(),
        config.alternate_reporting_type
    );

    FilterOutcome {
        kept,
        cross_region,
        gate_counts,
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Compute/Storage is checked first so the families never overlap.
pub fn product_family(
    scheme: &str,
    data_type: Option<&DataType>,
    product_line: &str,
    config: &ClassificationConfig,
) -> Option<ProductFamily> {
    let data_type = data_type?;

    let compute_or_storage =
        contains_ignore_case(scheme, "compute") || contains_ignore_case(scheme, "storage");
    if compute_or_storage {
        let eligible = *data_type == DataType::DirectSale
            || (data_type.is_order() && product_line == config.reserved_product_line);
        if eligible {
            return Some(ProductFamily::ComputeStorage);
        }
    }

    let services = contains_ignore_case(scheme, "services")
        && (*data_type == DataType::DirectSale || data_type.is_order());
    if services {
        return Some(ProductFamily::Services);
    }

    None
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Scheme for a Services record after the standalone/common-PL rules.
pub fn reclassify_services(
    scheme: &str,
    standalone_tag: Option<&str>,
    common_tag: Option<&str>,
    portfolio_mapping_1: Option<&str>,
    portfolio_mapping_2: Option<&str>,
    config: &ClassificationConfig,
) -> String {
    if let Some(tag) = non_empty(standalone_tag) {
        if !config.standalone_labels.iter().any(|label| label == tag) {
            debug!("Unrecognised standalone tag '{}' leaves '{}' unchanged", tag, scheme);
        }
        return scheme.to_string();
    }

    if non_empty(common_tag) != Some(config.common_pl_label.as_str()) {
        return scheme.to_string();
    }

    let mapping_1 = non_empty(portfolio_mapping_1);
    let mapping_2 = non_empty(portfolio_mapping_2);
    let complete_care = mapping_2.is_some_and(|m| {
        config
            .complete_care_prefixes
            .iter()
            .any(|prefix| m.starts_with(prefix.as_str()))
    });

    let operational = mapping_1.is_some_and(|m| m.starts_with(&config.operational_service_prefix));
    if operational && complete_care {
        config.services_focus_scheme.clone()
    } else if mapping_1.is_some() && mapping_2.is_some() && !complete_care {
        config.services_standard_scheme.clone()
    } else {
        scheme.to_string()
    }
}

/// Annotates one record against a region's reference rules. Pure.
pub fn classify(
    record: &Rc<TransactionRecord>,
    rules: &ReferenceRules,
    config: &ClassificationConfig,
    currency: Currency,
) -> ClassifiedRecord {
    let product_line = record.product_line();

    let business_unit = rules.business_units.get(product_line).cloned();
    let program_type = rules.program_types.get(product_line).cloned();
    let base_scheme = format!(
        "{}{}",
        business_unit.as_deref().unwrap_or(""),
        program_type.as_deref().unwrap_or("")
    );

    let exclusion_level = record
        .reseller_id
        .as_ref()
        .and_then(|id| rules.exclusion_levels.get(id))
        .filter(|level| !config.is_no_exclusion(level))
        .cloned();

    let coverage = match &record.reseller_id {
        Some(id) if rules.pg_eligible.contains(id) => Coverage::Pg,
        _ => Coverage::Sbp,
    };

    let partner = record
        .distributor_id
        .as_ref()
        .filter(|id| rules.locations.contains(*id))
        .cloned();

    let deal_excluded = record
        .backend_deal
        .as_ref()
        .is_some_and(|deal| rules.eligible_deals.contains(deal));

    let standalone_tag = rules.standalone_tags.get(product_line).cloned();
    let common_tag = rules.common_tags.get(product_line).cloned();

    let family = if base_scheme.is_empty() {
        None
    } else {
        product_family(&base_scheme, record.data_type.as_ref(), product_line, config)
    };

    let scheme = match family {
        Some(ProductFamily::Services) => reclassify_services(
            &base_scheme,
            standalone_tag.as_deref(),
            common_tag.as_deref(),
            record.portfolio_mapping_1.as_deref(),
            record.portfolio_mapping_2.as_deref(),
            config,
        ),
        _ => base_scheme,
    };

    ClassifiedRecord {
        record: Rc::clone(record),
        business_unit,
        program_type,
        scheme,
        family,
        exclusion_level,
        coverage,
        partner,
        deal_excluded,
        standalone_tag,
        common_tag,
        reconciliation: reconcile(record.amounts(currency)),
    }
}

pub fn classify_all(
    records: &[Rc<TransactionRecord>],
    rules: &ReferenceRules,
    config: &ClassificationConfig,
    currency: Currency,
) -> Vec<ClassifiedRecord> {
    let classified: Vec<ClassifiedRecord> = records
        .iter()
        .map(|r| classify(r, rules, config, currency))
        .collect();

    let mapped = classified.iter().filter(|c| !c.scheme.is_empty()).count();
    let tagged = classified.iter().filter(|c| c.partner.is_some()).count();
    let in_family = classified.iter().filter(|c| c.family.is_some()).count();
    debug!(
        "Classified {} rows: {} with a scheme, {} in a product family, {} with a distributor partner",
        classified.len(),
        mapped,
        in_family,
        tagged
    );

    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Amounts, ReferenceRow};

    fn record(pl: &str, data_type: &str) -> TransactionRecord {
        TransactionRecord {
            source_system: Some(2032),
            product_line: Some(pl.to_string()),
            reseller_id: Some("500".to_string()),
            distributor_id: Some("900".to_string()),
            data_type: Some(DataType::parse(data_type)),
            usd: Amounts {
                list_price: Some(100.0),
                net: Some(90.0),
                upfront: Some(5.0),
                backend: Some(5.0),
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
                pg_eligible_party_id: Some("500".to_string()),
                location_id: Some("900".to_string()),
                eligible_deal: Some("D1".to_string()),
                ..Default::default()
            },
            ReferenceRow {
                product_line: Some("SV".to_string()),
                business_unit: Some("Services".to_string()),
                program_type: Some("Standard".to_string()),
                exclusion_party_id: Some("501".to_string()),
                exclusion_level: Some("OEM".to_string()),
                common_product_line: Some("SV".to_string()),
                common_tag: Some("Common PL".to_string()),
                ..Default::default()
            },
            ReferenceRow {
                product_line: Some("N3".to_string()),
                business_unit: Some("Storage".to_string()),
                program_type: Some("Focus".to_string()),
                ..Default::default()
            },
        ];
        ReferenceRules::from_rows(&rows, &["NA".to_string()])
    }

    #[test]
    fn test_filter_chain() {
        let mut wrong_source = record("AB", "DS");
        wrong_source.source_system = Some(1111);
        let mut cross_sourced = record("AB", "DS");
        cross_sourced.cross_sourced = Some("Y".to_string());
        let mut bde = record("AB", "DS");
        bde.bde_flag = Some("Y".to_string());
        let mut msp = record("AB", "DS");
        msp.msp_flag = Some("T".to_string());
        let mut rcs = record("AB", "DS");
        rcs.reporting_type = Some("RCS".to_string());
        let clean = record("AB", "DS");

        let outcome = apply_filters(
            vec![wrong_source, cross_sourced, bde, msp, rcs, clean],
            &FilterConfig::default(),
        );

        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.cross_region.len(), 1);
        assert_eq!(outcome.kept[0].bde_flag.as_deref(), Some("N"));
        let remaining: Vec<usize> = outcome.gate_counts.iter().map(|g| g.remaining).collect();
        assert_eq!(remaining, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_classify_tags() {
        let mut raw = record("AB", "DS");
        raw.backend_deal = Some("D1".to_string());
        let classified = classify(
            &Rc::new(raw),
            &rules(),
            &ClassificationConfig::default(),
            Currency::Usd,
        );

        assert_eq!(classified.scheme, "ComputeStandard");
        assert_eq!(classified.family, Some(ProductFamily::ComputeStorage));
        assert_eq!(classified.coverage, Coverage::Pg);
        assert_eq!(classified.partner.as_deref(), Some("900"));
        assert!(classified.deal_excluded);
        assert_eq!(classified.exclusion_level, None);
        assert_eq!(classified.reconciliation.delta, Some(0.0));
    }

    #[test]
    fn test_unmapped_product_line_has_no_scheme() {
        let classified = classify(
            &Rc::new(record("ZZ", "DS")),
            &rules(),
            &ClassificationConfig::default(),
            Currency::Usd,
        );
        assert_eq!(classified.scheme, "");
        assert_eq!(classified.family, None);
    }

    #[test]
    fn test_orders_only_count_for_reserved_product_line() {
        let config = ClassificationConfig::default();
        let orders = DataType::Orders;
        assert_eq!(
            product_family("StorageFocus", Some(&orders), "N3", &config),
            Some(ProductFamily::ComputeStorage)
        );
        assert_eq!(product_family("ComputeStandard", Some(&orders), "AB", &config), None);
        assert_eq!(
            product_family("ServicesStandard", Some(&orders), "SV", &config),
            Some(ProductFamily::Services)
        );
        assert_eq!(product_family("ServicesStandard", None, "SV", &config), None);
    }

    #[test]
    fn test_services_reclassification() {
        let config = ClassificationConfig::default();
        let focus = reclassify_services(
            "ServicesStandard",
            None,
            Some("Common PL"),
            Some("Operational Services"),
            Some("Complete Care (excl. MS & GL) Plus"),
            &config,
        );
        assert_eq!(focus, "ServicesFocus");

        let alternate_spelling = reclassify_services(
            "ServicesStandard",
            None,
            Some("Common PL"),
            Some("Operational Services"),
            Some("Complete Care (excluding MS & GL)"),
            &config,
        );
        assert_eq!(alternate_spelling, "ServicesFocus");

        let standard = reclassify_services(
            "ServicesFocus",
            None,
            Some("Common PL"),
            Some("Advisory"),
            Some("Foundation Care"),
            &config,
        );
        assert_eq!(standard, "ServicesStandard");

        let standalone = reclassify_services(
            "ServicesFocus",
            Some("Services Focus standalone"),
            Some("Common PL"),
            Some("Advisory"),
            Some("Foundation Care"),
            &config,
        );
        assert_eq!(standalone, "ServicesFocus");

        let missing_mapping = reclassify_services(
            "ServicesFocus",
            None,
            Some("Common PL"),
            Some("Advisory"),
            None,
            &config,
        );
        assert_eq!(missing_mapping, "ServicesFocus");
    }

    #[test]
    fn test_exclusion_level_lookup() {
        let mut raw = record("SV", "DS");
        raw.reseller_id = Some("501".to_string());
        raw.portfolio_mapping_1 = Some("Advisory".to_string());
        raw.portfolio_mapping_2 = Some("Foundation Care".to_string());
        let classified = classify(
            &Rc::new(raw),
            &rules(),
            &ClassificationConfig::default(),
            Currency::Usd,
        );
        assert_eq!(classified.exclusion_level.as_deref(), Some("OEM"));
        assert_eq!(classified.coverage, Coverage::Sbp);
        assert_eq!(classified.scheme, "ServicesStandard");
        assert_eq!(classified.family, Some(ProductFamily::Services));
    }
}
