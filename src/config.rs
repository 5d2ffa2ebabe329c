//! Run configuration: header mappings, filter constants, classification
//! labels, rate tables and per-region settings.
//!
//! Every value has a production default, so `FlashReportConfig::default()` is
//! a complete configuration. Header mappings can be overridden from a
//! `column_mappings.json` document.

use crate::error::{FlashReportError, Result};
use crate::schema::Currency;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn aliases(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(canonical, variants)| {
            (
                canonical.to_string(),
                variants.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Column mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMappings {
    #[serde(default = "ColumnMappings::default_main")]
    #[schemars(
        description = "Canonical transaction field -> accepted header spellings, tried in order"
    )]
    pub main_file_mappings: BTreeMap<String, Vec<String>>,

    #[serde(default = "ColumnMappings::default_reference")]
    #[schemars(description = "Canonical reference field -> accepted header spellings, tried in order")]
    pub reference_file_mappings: BTreeMap<String, Vec<String>>,
}

impl ColumnMappings {
    fn default_main() -> BTreeMap<String, Vec<String>> {
        aliases(&[
            ("SRC_SYS_KY", &["SRC_SYS_KY", "Src Sys Ky"]),
            ("CROSS_SOURCED", &["CROSS_SOURCED", "Cross Sourced"]),
            ("BDE_FLAG", &["BDE_FLAG", "Bde Flag"]),
            ("MSP_FLAG", &["MSP_FLAG", "MSP Flag"]),
            ("REPORTING_TYPE", &["REPORTING_TYPE", "Reporting Type"]),
            ("PRODUCT_LINE", &["PRODUCT_LINE", "Product Line"]),
            ("RESELLER_PARTY_ID", &["RESELLER_PARTY_ID", "Reseller Party Id"]),
            ("DISTRIBUTOR_PARTY_ID", &["DISTRIBUTOR_PARTY_ID", "Distributor Party Id"]),
            ("FISCAL_MONTH", &["FISCAL_MONTH", "Fiscal Month"]),
            ("NDP_TOTAL_USD", &["NDP_TOTAL_USD", "Ndp Total Usd"]),
            ("NET_TOTAL_USD", &["NET_TOTAL_USD", "Net Total Usd"]),
            ("UPFRONT_DISCOUNT_AMT_USD", &["UPFRONT_DISCOUNT_AMT_USD", "Upfront Discount Amt Usd"]),
            ("BACKEND_DISCOUNT_AMT_USD", &["BACKEND_DISCOUNT_AMT_USD", "Backend Discount Amt Usd"]),
            ("DATA_TYPE", &["DATA_TYPE", "Data Type"]),
            ("BACKEND_DEAL_1", &["BACKEND_DEAL_1", "Backend Deal 1"]),
            ("INVOICE_NUMBER", &["INVOICE_NUMBER", "Invoice Number"]),
            ("HPE_SALES_ORDER_NUMBER", &["HPE_SALES_ORDER_NUMBER", "Hpe Sales Order Number"]),
            ("NET_TOTAL_LC", &["NET_TOTAL_LC", "Net Total Lc"]),
            ("BACKEND_DISCOUNT_AMT_LC", &["BACKEND_DISCOUNT_AMT_LC", "Backend Discount Amt Lc"]),
            ("UPFRONT_DISCOUNT_AMT_LC", &["UPFRONT_DISCOUNT_AMT_LC", "Upfront Discount Amt Lc"]),
            ("NDP_TOTAL_LC", &["NDP_TOTAL_LC", "Ndp Total Lc"]),
            ("DISTRIBUTOR_PARTY_NAME", &["Distributor Party Name", "DISTRIBUTOR_PARTY_NAME"]),
            ("RESELLER_PARTY_NAME", &["Reseller Party Name", "RESELLER_PARTY_NAME"]),
            ("PRODUCT_NUMBER", &["Product Number", "PRODUCT_NUMBER"]),
            ("PORTFOLIO_MAPPING_1", &["Point Next Portfolio Mapping 1", "PORTFOLIO_MAPPING_1"]),
            ("PORTFOLIO_MAPPING_2", &["Point Next Portfolio Mapping 2", "PORTFOLIO_MAPPING_2"]),
        ])
    }

    fn default_reference() -> BTreeMap<String, Vec<String>> {
        aliases(&[
            ("PL", &["PL"]),
            ("BU", &["BU"]),
            ("TYPE", &["TYPE", "Type"]),
            ("EXCLUSION_PARTY_ID", &["EXCLUSION_PARTY_ID", "Exclusion_Party ID"]),
            ("EXCLUSION_LEVEL", &["EXCLUSION_LEVEL", "Exclusion_Level"]),
            (
                "PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID",
                &["PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID", "PG Exclusion Eligible List_Party ID"],
            ),
            ("LOC_ID", &["LOC_ID", "Loc Id"]),
            ("ELICPES", &["ELICPES", "Elicpes"]),
            ("PN_PL", &["PN_PL", "PN PL"]),
            ("BU_1", &["BU_1", "BU.1"]),
            ("COMMON_PL", &["COMMON_PL", "Common PL"]),
            ("COMMON_PN_PL", &["COMMON_PN_PL", "Common PN PL"]),
        ])
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses the mappings document at `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Loads mappings from `path`, falling back to the built-in defaults when
    /// the document is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_path(path) {
            Ok(mappings) => mappings,
            Err(FlashReportError::IoError(e)) => {
                warn!(
                    "Column mappings not readable at {} ({}); using built-in defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Column mappings at {} are malformed ({}); using built-in defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

impl Default for ColumnMappings {
    fn default() -> Self {
        Self {
            main_file_mappings: Self::default_main(),
            reference_file_mappings: Self::default_reference(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolver thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResolverConfig {
    #[schemars(description = "Minimum similarity for an alias to match a header approximately")]
    pub alias_cutoff: f64,
    #[schemars(description = "Minimum similarity for the canonical name to match a header")]
    pub canonical_cutoff: f64,
    #[schemars(description = "Minimum similarity for a header to be offered as a suggestion")]
    pub suggestion_cutoff: f64,
    pub max_suggestions: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            alias_cutoff: 0.8,
            canonical_cutoff: 0.7,
            suggestion_cutoff: 0.5,
            max_suggestions: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter gates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FilterConfig {
    #[schemars(description = "Source-system keys whose records are kept")]
    pub accepted_source_systems: Vec<i64>,
    #[schemars(description = "Cross-sourced flag value that drops a record")]
    pub cross_sourced_flag: String,
    #[schemars(description = "BDE flag value that drops a record")]
    pub bde_flag: String,
    #[schemars(description = "Value written to blank BDE flags after the gate")]
    pub bde_default: String,
    #[schemars(description = "MSP flag value marking a transfer record")]
    pub msp_transfer_flag: String,
    #[schemars(description = "Reporting type routed to the cross-region side channel")]
    pub alternate_reporting_type: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            accepted_source_systems: vec![2032, 2866],
            cross_sourced_flag: "Y".to_string(),
            bde_flag: "Y".to_string(),
            bde_default: "N".to_string(),
            msp_transfer_flag: "T".to_string(),
            alternate_reporting_type: "RCS".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassificationConfig {
    #[schemars(description = "Product line whose Orders/S4DOR records count as Compute/Storage")]
    pub reserved_product_line: String,
    #[schemars(description = "Standalone tags that leave a Services scheme unchanged")]
    pub standalone_labels: Vec<String>,
    #[schemars(description = "Common-PL tag that enables portfolio-based reclassification")]
    pub common_pl_label: String,
    #[schemars(description = "Prefix of portfolio mapping 1 for the ServicesFocus rule")]
    pub operational_service_prefix: String,
    #[schemars(description = "Accepted spellings of the Complete Care prefix of portfolio mapping 2")]
    pub complete_care_prefixes: Vec<String>,
    pub services_focus_scheme: String,
    pub services_standard_scheme: String,
    #[schemars(description = "Exclusion-level values that mean no exclusion")]
    pub no_exclusion_markers: Vec<String>,
    pub oem_exclusion_level: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            reserved_product_line: "N3".to_string(),
            standalone_labels: strings(&[
                "Services Focus standalone",
                "Services Standard standalone",
                "Focus standalone",
                "Standard standalone",
            ]),
            common_pl_label: "Common PL".to_string(),
            operational_service_prefix: "Operational Service".to_string(),
            complete_care_prefixes: strings(&[
                "Complete Care (excl. MS & GL)",
                "Complete Care (excluding MS & GL)",
            ]),
            services_focus_scheme: "ServicesFocus".to_string(),
            services_standard_scheme: "ServicesStandard".to_string(),
            no_exclusion_markers: strings(&["NA"]),
            oem_exclusion_level: "OEM".to_string(),
        }
    }
}

impl ClassificationConfig {
    pub fn is_no_exclusion(&self, level: &str) -> bool {
        let level = level.trim();
        level.is_empty() || self.no_exclusion_markers.iter().any(|m| m == level)
    }
}

// ---------------------------------------------------------------------------
// Rebates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RebateConfig {
    #[schemars(description = "'{program}_{PG|SBP}' -> rebate rate; unmapped keys use a zero rate")]
    pub program_rates: BTreeMap<String, f64>,
    #[schemars(description = "Expansion scheme -> fixed dollar program value")]
    pub expansion_values: BTreeMap<String, f64>,
    #[schemars(description = "Substrings (case-insensitive) that select a ledger scheme")]
    pub scheme_markers: Vec<String>,
    #[schemars(description = "Prefix (case-sensitive) that selects a ledger scheme")]
    pub scheme_prefix: String,
    #[schemars(description = "Ledger rows with any text cell starting with this are dropped")]
    pub excluded_text_prefix: String,
    #[schemars(description = "Ledger rows with any text cell containing this are dropped")]
    pub excluded_text_fragment: String,
    pub partner_type: String,
    pub summary_sheet: String,
    pub details_sheet: String,
}

impl Default for RebateConfig {
    fn default() -> Self {
        let program_rates = [
            ("ComputeStandard_PG", 0.005),
            ("StorageStandard_PG", 0.005),
            ("ComputeStandard_SBP", 0.055),
            ("StorageStandard_SBP", 0.055),
            ("ComputeFocus_PG", 0.035),
            ("StorageFocus_PG", 0.035),
            ("ComputeFocus_SBP", 0.065),
            ("StorageFocus_SBP", 0.065),
            ("ServicesStandard_PG", 0.02),
            ("ServicesStandard_SBP", 0.04),
            ("ServicesFocus_PG", 0.04),
            ("ServicesFocus_SBP", 0.06),
        ];
        let expansion_values = [
            ("Compute Expansion L1", 700.0),
            ("Compute Expansion L2", 750.0),
            ("Compute Expansion L3", 800.0),
            ("Services Expansion L1", 250.0),
            ("Services Expansion L2", 600.0),
            ("Storage Expansion L1", 650.0),
            ("Storage Expansion L2", 700.0),
            ("Storage Expansion L3", 1000.0),
        ];

        Self {
            program_rates: program_rates
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            expansion_values: expansion_values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            scheme_markers: strings(&["L1", "L2", "L3"]),
            scheme_prefix: "aaS".to_string(),
            excluded_text_prefix: "LAR".to_string(),
            excluded_text_fragment: "LAC".to_string(),
            partner_type: "DISTRIBUTOR".to_string(),
            summary_sheet: "RebateSummary".to_string(),
            details_sheet: "RebateDetails".to_string(),
        }
    }
}

impl RebateConfig {
    /// Rate for a "{program}_{PG|SBP}" key. Unmapped keys are a zero rate.
    pub fn rate_for(&self, key: &str) -> f64 {
        self.program_rates.get(key).copied().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// As-a-service ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SaasConfig {
    #[schemars(description = "Zero-based position of the eligible-sales sheet in the ledger workbook")]
    pub eligible_sheet_index: usize,
    pub eligible_product_line_column: String,
    pub product_line_column: String,
    pub seller_column: String,
    pub buyer_column: String,
    #[schemars(description = "Program the coverage is credited to; the scheme is '{program}_{PG|SBP}'")]
    pub program: String,
    #[schemars(description = "Product line written on the appended coverage row")]
    pub product_line: String,
}

impl Default for SaasConfig {
    fn default() -> Self {
        Self {
            eligible_sheet_index: 2,
            eligible_product_line_column: "Saas eligible PL's".to_string(),
            product_line_column: "PRODUCTLINE_ID".to_string(),
            seller_column: "REPORTING_SELLER_ID".to_string(),
            buyer_column: "BUYER_PARTNER_ID".to_string(),
            program: "ComputeFocus".to_string(),
            product_line: "S3".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegionConfig {
    #[schemars(description = "Region code, e.g. 'US' or 'CA'")]
    pub code: String,
    pub currency: Currency,
    #[schemars(description = "Incentive name written on summary rows")]
    pub incentive_name: String,
    pub report_workbook: String,
    pub report_sheet: String,
    #[schemars(description = "Folder prefix for per-partner workbooks")]
    pub partner_folder: String,
    #[schemars(description = "COUNTRY values (case-insensitive) selecting this region's ledger rows")]
    pub rebate_country_codes: Vec<String>,
    #[schemars(description = "Partners that get Attach and Annuity extracts")]
    pub auxiliary_partners: Vec<String>,
    #[schemars(description = "Zero-based position of this region's sheet in the as-a-service ledger")]
    pub saas_sheet_index: usize,
    pub saas_amount_column: String,
    pub saas_location_column: String,
    pub saas_company_column: String,
}

impl RegionConfig {
    pub fn us() -> Self {
        Self {
            code: "US".to_string(),
            currency: Currency::Usd,
            incentive_name: "US FinBen".to_string(),
            report_workbook: "Final_Report_USD_US".to_string(),
            report_sheet: "USD Report US".to_string(),
            partner_folder: "US_partners_report".to_string(),
            rebate_country_codes: strings(&["US"]),
            auxiliary_partners: strings(&["1000939629", "1001810197"]),
            saas_sheet_index: 0,
            saas_amount_column: "TCV_NET_EXTENDED_AMOUNT".to_string(),
            saas_location_column: "US_Loc Id".to_string(),
            saas_company_column: "US_RS Company Name".to_string(),
        }
    }

    pub fn ca() -> Self {
        Self {
            code: "CA".to_string(),
            currency: Currency::Lc,
            incentive_name: "CA FinBen".to_string(),
            report_workbook: "Final_Report_Canada_CA".to_string(),
            report_sheet: "LC Report CA".to_string(),
            partner_folder: "Canada_partners_report".to_string(),
            rebate_country_codes: strings(&["CA", "CANADA"]),
            auxiliary_partners: Vec::new(),
            saas_sheet_index: 1,
            saas_amount_column: "TCV_NET_EXTENDED_AMOUNT_LC".to_string(),
            saas_location_column: "CA_Loc Id".to_string(),
            saas_company_column: "CA_RS Company Name".to_string(),
        }
    }

    pub fn partner_workbook(&self, partner_id: &str) -> String {
        format!("{}/Disty_Partner_{}_Report", self.partner_folder, partner_id)
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FlashReportConfig {
    pub column_mappings: ColumnMappings,
    #[schemars(description = "Canonical transaction fields that must resolve")]
    pub required_main_fields: Vec<String>,
    #[schemars(description = "Canonical reference fields that must resolve")]
    pub required_reference_fields: Vec<String>,
    pub resolver: ResolverConfig,
    pub filters: FilterConfig,
    pub classification: ClassificationConfig,
    pub rebate: RebateConfig,
    pub saas: SaasConfig,
    pub regions: Vec<RegionConfig>,
}

impl Default for FlashReportConfig {
    fn default() -> Self {
        Self {
            column_mappings: ColumnMappings::default(),
            required_main_fields: strings(&[
                "SRC_SYS_KY",
                "CROSS_SOURCED",
                "BDE_FLAG",
                "MSP_FLAG",
                "REPORTING_TYPE",
                "PRODUCT_LINE",
                "RESELLER_PARTY_ID",
                "DISTRIBUTOR_PARTY_ID",
                "FISCAL_MONTH",
                "NDP_TOTAL_USD",
                "NET_TOTAL_USD",
                "UPFRONT_DISCOUNT_AMT_USD",
                "BACKEND_DISCOUNT_AMT_USD",
                "DATA_TYPE",
                "BACKEND_DEAL_1",
                "INVOICE_NUMBER",
                "HPE_SALES_ORDER_NUMBER",
                "NET_TOTAL_LC",
                "BACKEND_DISCOUNT_AMT_LC",
                "UPFRONT_DISCOUNT_AMT_LC",
                "NDP_TOTAL_LC",
            ]),
            required_reference_fields: strings(&[
                "PL",
                "BU",
                "TYPE",
                "EXCLUSION_PARTY_ID",
                "EXCLUSION_LEVEL",
                "PG_EXCLUSION_ELIGIBLE_LIST_PARTY_ID",
                "LOC_ID",
                "ELICPES",
                "PN_PL",
                "BU_1",
                "COMMON_PL",
                "COMMON_PN_PL",
            ]),
            resolver: ResolverConfig::default(),
            filters: FilterConfig::default(),
            classification: ClassificationConfig::default(),
            rebate: RebateConfig::default(),
            saas: SaasConfig::default(),
            regions: vec![RegionConfig::us(), RegionConfig::ca()],
        }
    }
}

impl FlashReportConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(FlashReportError::Config(
                "at least one region must be configured".to_string(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for region in &self.regions {
            if !seen.insert(region.code.as_str()) {
                return Err(FlashReportError::Config(format!(
                    "region '{}' is configured more than once",
                    region.code
                )));
            }
        }

        for (name, cutoff) in [
            ("alias_cutoff", self.resolver.alias_cutoff),
            ("canonical_cutoff", self.resolver.canonical_cutoff),
            ("suggestion_cutoff", self.resolver.suggestion_cutoff),
        ] {
            if !(0.0..=1.0).contains(&cutoff) {
                return Err(FlashReportError::Config(format!(
                    "{name} must be within [0, 1], got {cutoff}"
                )));
            }
        }

        Ok(())
    }

    pub fn region(&self, code: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.code == code)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FlashReportConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let rebate = RebateConfig::default();
        assert!((rebate.rate_for("ComputeStandard_PG") - 0.005).abs() < 1e-12);
        assert!((rebate.rate_for("ServicesFocus_SBP") - 0.06).abs() < 1e-12);
        assert_eq!(rebate.rate_for("SomethingElse_PG"), 0.0);
    }

    #[test]
    fn test_partial_mapping_document_keeps_defaults() {
        let json = r#"{"main_file_mappings": {"PRODUCT_LINE": ["PL Code"]}}"#;
        let mappings = ColumnMappings::from_json_str(json).unwrap();
        assert_eq!(
            mappings.main_file_mappings.get("PRODUCT_LINE"),
            Some(&vec!["PL Code".to_string()])
        );
        assert!(mappings.reference_file_mappings.contains_key("LOC_ID"));
    }

    #[test]
    fn test_missing_mapping_file_falls_back() {
        let mappings = ColumnMappings::load_or_default(Path::new("/nonexistent/column_mappings.json"));
        assert_eq!(mappings, ColumnMappings::default());
    }

    #[test]
    fn test_mapping_file_errors() {
        let missing = ColumnMappings::from_path(Path::new("/nonexistent/column_mappings.json"));
        assert!(matches!(missing, Err(FlashReportError::IoError(_))));

        let path = std::env::temp_dir().join(format!("flash_report_mappings_{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let malformed = ColumnMappings::from_path(&path);
        assert!(matches!(malformed, Err(FlashReportError::SerializationError(_))));
        assert_eq!(ColumnMappings::load_or_default(&path), ColumnMappings::default());

        std::fs::write(&path, r#"{"main_file_mappings": {"PRODUCT_LINE": ["PL Code"]}}"#).unwrap();
        let loaded = ColumnMappings::from_path(&path).unwrap();
        assert_eq!(
            loaded.main_file_mappings.get("PRODUCT_LINE"),
            Some(&vec!["PL Code".to_string()])
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_no_exclusion_markers() {
        let config = ClassificationConfig::default();
        assert!(config.is_no_exclusion("NA"));
        assert!(config.is_no_exclusion("  "));
        assert!(!config.is_no_exclusion("OEM"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = FlashReportConfig::default();
        assert!(config.validate().is_ok());

        config.regions.push(RegionConfig::us());
        assert!(matches!(config.validate(), Err(FlashReportError::Config(_))));
    }

    #[test]
    fn test_config_schema_generation() {
        let schema_json = FlashReportConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("program_rates"));
        assert!(schema_json.contains("column_mappings"));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = FlashReportConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = FlashReportConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.region("CA").map(|r| r.currency),
            Some(Currency::Lc)
        );
    }
}
