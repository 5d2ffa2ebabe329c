//! Header resolution: maps the column names a dataset actually carries onto
//! canonical field names.

use crate::config::ResolverConfig;
use crate::error::{FlashReportError, Result};
use crate::table::Table;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Ratcliff/Obershelp similarity `2*M/T`, where `M` counts the characters in
/// the longest common block plus, recursively, the matches to its left and
/// right, and `T` is the combined length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, size) = longest_common_block(a, b);
    if size == 0 {
        return 0;
    }
    size + matched_chars(&a[..i], &b[..j]) + matched_chars(&a[i + size..], &b[j + size..])
}

/// Earliest longest common block as `(start_a, start_b, len)`.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                cur[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = cur;
    }

    best
}

/// Up to `n` candidates scoring at least `cutoff` against `word`, best first.
/// Equal scores keep candidate order.
pub fn close_matches<'a>(
    word: &str,
    candidates: impl IntoIterator<Item = &'a String>,
    n: usize,
    cutoff: f64,
) -> Vec<String> {
    let mut scored: Vec<(f64, &String)> = candidates
        .into_iter()
        .map(|c| (similarity(c, word), c))
        .filter(|(score, _)| *score >= cutoff)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(n).map(|(_, c)| c.clone()).collect()
}

/// Outcome of resolving one header set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Source header -> canonical field.
    pub renames: BTreeMap<String, String>,
    /// Canonical fields with no matching header.
    pub unresolved: Vec<String>,
}

impl Resolution {
    pub fn header_for(&self, canonical: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|(_, c)| c.as_str() == canonical)
            .map(|(h, _)| h.as_str())
    }

    pub fn is_resolved(&self, canonical: &str) -> bool {
        self.header_for(canonical).is_some()
    }
}

pub struct SchemaResolver<'a> {
    mappings: &'a BTreeMap<String, Vec<String>>,
    thresholds: &'a ResolverConfig,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(mappings: &'a BTreeMap<String, Vec<String>>, thresholds: &'a ResolverConfig) -> Self {
        Self {
            mappings,
            thresholds,
        }
    }

    /// Resolves every canonical field in the mapping plus `extra_fields`.
    ///
    /// Literal matches are settled for all fields before any approximate
    /// matching, so an exact header is never taken by a near-miss of another
    /// field. Within each pass fields are visited in canonical-name order and
    /// a header is claimed at most once.
    pub fn resolve(&self, headers: &[String], extra_fields: &[String]) -> Resolution {
        let fields: BTreeSet<&str> = self
            .mappings
            .keys()
            .map(String::as_str)
            .chain(extra_fields.iter().map(String::as_str))
            .collect();

        let no_aliases: Vec<String> = Vec::new();
        let aliases_of = |field: &str| self.mappings.get(field).unwrap_or(&no_aliases);

        let mut claimed: BTreeSet<&str> = BTreeSet::new();
        let mut assigned: BTreeMap<&str, &str> = BTreeMap::new();

        // Literal: the canonical name itself, then each alias in order.
        for &field in &fields {
            let hit = std::iter::once(field)
                .chain(aliases_of(field).iter().map(String::as_str))
                .find_map(|candidate| {
                    headers
                        .iter()
                        .map(String::as_str)
                        .find(|h| *h == candidate && !claimed.contains(h))
                });
            if let Some(header) = hit {
                claimed.insert(header);
                assigned.insert(field, header);
            }
        }

        // Approximate: aliases first, then the canonical name.
        for &field in &fields {
            if assigned.contains_key(field) {
                continue;
            }
            let available: Vec<&String> = headers
                .iter()
                .filter(|h| !claimed.contains(h.as_str()))
                .collect();

            let by_alias = aliases_of(field).iter().find_map(|alias| {
                close_matches(alias, available.iter().copied(), 1, self.thresholds.alias_cutoff)
                    .into_iter()
                    .next()
            });
            let hit = by_alias.or_else(|| {
                close_matches(field, available.iter().copied(), 1, self.thresholds.canonical_cutoff)
                    .into_iter()
                    .next()
            });

            if let Some(hit) = hit {
                if let Some(header) = headers.iter().find(|h| **h == hit) {
                    debug!("Header '{}' approximately matched to '{}'", header, field);
                    claimed.insert(header.as_str());
                    assigned.insert(field, header.as_str());
                }
            }
        }

        let renames = assigned
            .iter()
            .map(|(field, header)| (header.to_string(), field.to_string()))
            .collect();
        let unresolved = fields
            .iter()
            .filter(|f| !assigned.contains_key(*f))
            .map(|f| f.to_string())
            .collect();

        Resolution {
            renames,
            unresolved,
        }
    }

    pub fn suggestions(&self, field: &str, headers: &[String]) -> Vec<String> {
        close_matches(
            field,
            headers,
            self.thresholds.max_suggestions,
            self.thresholds.suggestion_cutoff,
        )
    }

    /// Renames `table` to canonical headers. Fails when any `required` field
    /// stays unresolved; the error lists suggestions for each.
    pub fn resolve_table(&self, dataset: &str, table: &Table, required: &[String]) -> Result<Table> {
        let resolution = self.resolve(&table.columns, required);

        let missing: Vec<String> = required
            .iter()
            .filter(|f| !resolution.is_resolved(f))
            .cloned()
            .collect();

        if !missing.is_empty() {
            let suggestions = missing
                .iter()
                .map(|f| (f.clone(), self.suggestions(f, &table.columns)))
                .collect();
            return Err(FlashReportError::SchemaResolution {
                dataset: dataset.to_string(),
                missing,
                suggestions,
            });
        }

        for field in &resolution.unresolved {
            warn!("{}: optional column '{}' not found", dataset, field);
        }
        for (header, canonical) in &resolution.renames {
            if header != canonical {
                debug!("{}: '{}' -> '{}'", dataset, header, canonical);
            }
        }

        Ok(table.rename_columns(&resolution.renames))
    }
}
