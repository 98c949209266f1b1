use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::Error;
use crate::types::{ChildCodeRow, CodelistEntry, GroupValue, MeasureTable, Result};

fn normalise_code(value: &GroupValue) -> Result<i64> {
    value
        .as_integer()
        .ok_or_else(|| Error::MalformedInput(format!("code '{}' is not an integer", value)))
}

/// Index a codelist by integer code. Later duplicates keep the first term.
pub fn code_descriptions(codelist: &[CodelistEntry]) -> Result<HashMap<i64, String>> {
    let mut descriptions = HashMap::with_capacity(codelist.len());
    for entry in codelist {
        let code = normalise_code(&GroupValue::Text(entry.code.clone()))?;
        descriptions
            .entry(code)
            .or_insert_with(|| entry.term.clone());
    }
    Ok(descriptions)
}

/// Top `nrows` sub-codes by total event count, with their descriptions.
///
/// Events are summed per code (a code appears once per period, with explicit
/// zero rows). Ties are ordered by ascending code. Codes absent from the
/// codelist get no description.
pub fn summarise_child_codes(
    table: &MeasureTable,
    codelist: &[CodelistEntry],
    nrows: usize,
) -> Result<Vec<ChildCodeRow>> {
    let descriptions = code_descriptions(codelist)?;

    let mut events: BTreeMap<i64, u64> = BTreeMap::new();
    for row in &table.rows {
        let Some(group) = &row.group else {
            continue;
        };
        let code = normalise_code(group)?;
        let total = events.entry(code).or_insert(0);
        *total = total.saturating_add(row.numerator.unwrap_or(0));
    }

    let mut summary: Vec<ChildCodeRow> = events
        .into_iter()
        .map(|(code, events)| ChildCodeRow {
            code,
            events,
            events_thousands: events as f64 / 1000.0,
            description: descriptions.get(&code).cloned(),
        })
        .collect();

    // Stable: equal counts stay in ascending code order
    summary.sort_by(|a, b| b.events.cmp(&a.events));

    let unmatched = summary.iter().filter(|r| r.description.is_none()).count();
    debug!(
        codes = summary.len(),
        unmatched,
        nrows,
        "summarised child codes"
    );

    summary.truncate(nrows);
    Ok(summary)
}
