//! Set combination of sub-query frequency lists.
//!
//! Pure function of the sub-query definitions and their raw lists; no
//! remote calls happen here.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use concordia_core::{Error, FreqItem, ParadigmaticResultRow, Result, SubQueryItem};

/// Combine raw frequency lists, one per sub-query in the same order.
///
/// Required sub-queries are filtered by their own `min_freq` and
/// intersected. Values occurring at all in any negated sub-query are then
/// removed. Rows come back ordered by `total_freq` descending, then `value`
/// ascending.
pub fn combine(
    subqueries: &[SubQueryItem],
    raw_lists: &[&[FreqItem]],
) -> Result<Vec<ParadigmaticResultRow>> {
    if subqueries.len() != raw_lists.len() {
        return Err(Error::InvalidInput(format!(
            "{} sub-queries but {} frequency lists",
            subqueries.len(),
            raw_lists.len()
        )));
    }
    if !subqueries.iter().any(|s| !s.negated) {
        return Err(Error::InvalidCombination(
            "at least one sub-query must be non-negated".to_string(),
        ));
    }

    let freqs: Vec<HashMap<&str, u64>> = raw_lists.iter().map(|list| index(list)).collect();

    let mut required: Option<HashSet<&str>> = None;
    for (sub, freq) in subqueries.iter().zip(&freqs) {
        if sub.negated {
            continue;
        }
        let passing: HashSet<&str> = freq
            .iter()
            .filter(|(_, f)| **f >= sub.min_freq)
            .map(|(v, _)| *v)
            .collect();
        debug!(cql = %sub.cql, kept = passing.len(), raw = freq.len(), "Sub-query filtered");
        required = Some(match required {
            None => passing,
            Some(acc) => acc.intersection(&passing).copied().collect(),
        });
    }
    let required = required.unwrap_or_default();

    let excluded: HashSet<&str> = subqueries
        .iter()
        .zip(&freqs)
        .filter(|(sub, _)| sub.negated)
        .flat_map(|(_, freq)| freq.keys().copied())
        .collect();

    let survivors: BTreeSet<&str> = required
        .into_iter()
        .filter(|v| !excluded.contains(v))
        .collect();

    let mut rows: Vec<ParadigmaticResultRow> = survivors
        .into_iter()
        .map(|value| {
            trace!(value, "Combining row");
            let per_subquery_freq: Vec<u64> = subqueries
                .iter()
                .zip(&freqs)
                .map(|(sub, freq)| {
                    if sub.negated {
                        0
                    } else {
                        freq.get(value).copied().unwrap_or(0)
                    }
                })
                .collect();
            let total_freq = per_subquery_freq.iter().sum();
            ParadigmaticResultRow {
                value: value.to_string(),
                per_subquery_freq,
                total_freq,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total_freq.cmp(&a.total_freq).then_with(|| a.value.cmp(&b.value)));
    Ok(rows)
}

/// Value -> frequency; repeated values accumulate.
fn index(list: &[FreqItem]) -> HashMap<&str, u64> {
    let mut map: HashMap<&str, u64> = HashMap::with_capacity(list.len());
    for item in list {
        *map.entry(item.value.as_str()).or_insert(0) += item.freq;
    }
    map
}
