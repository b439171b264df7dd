//! Canonicalization of event identity fields and flattening of the variable
//! attribute list into top-level record fields. Pure functions, no I/O.

use crate::event::WidgetChange;
use std::collections::BTreeMap;

/// A flat table-store row. Keyed by the composite primary key fields `id`
/// and `widgetId` that [`flatten`] always populates.
pub type TableRow = BTreeMap<String, String>;

/// Canonicalize an owner string for identity derivation: trim, lower-case,
/// and collapse internal whitespace runs into single hyphens.
pub fn normalize_owner(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Build the flat table-store row for a create or update event.
///
/// `owner` is renamed to `id` (normalized) on this path only; every valid
/// `{name, value}` attribute is copied to a top-level field in list order,
/// so later entries win on duplicate names, and `otherAttributes` itself
/// does not survive.
pub fn flatten(event_kind: &str, change: &WidgetChange) -> TableRow {
    let mut row = TableRow::new();
    row.insert("id".to_string(), normalize_owner(&change.owner));
    row.insert("widgetId".to_string(), change.widget_id.clone());
    row.insert("type".to_string(), event_kind.to_string());
    if let Some(description) = &change.description {
        row.insert("description".to_string(), description.clone());
    }
    for attr in &change.other_attributes {
        if attr.name.is_empty() {
            continue;
        }
        row.insert(attr.name.clone(), attr.value.clone());
    }
    row
}
