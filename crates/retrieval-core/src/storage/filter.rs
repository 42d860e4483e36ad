//! Centralized WHERE-predicate construction.
//!
//! The teacher scatters `format!("col = '{}'", v.replace('\'', "''"))`
//! across half a dozen methods in `storage/lance_store.rs` and
//! `types.rs::MetadataFilter::to_lance_predicate`. Here that one escaping
//! rule lives in exactly one function; every predicate builder in this
//! crate goes through it, so a future column can't reintroduce an
//! injection bug by hand-writing its own `replace('\'', "''")`.

use crate::types::MetadataFilter;

/// Escape a string literal for interpolation into a Lance/SQL-style WHERE
/// clause by doubling embedded single quotes.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn eq_string(column: &str, value: &str) -> String {
    format!("{column} = '{}'", escape_literal(value))
}

pub fn eq_u32(column: &str, value: u32) -> String {
    format!("{column} = {value}")
}

pub fn in_u32_list(column: &str, values: &[u32]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let list = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{column} IN ({list})"))
}

pub fn in_string_list(column: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let list = values
        .iter()
        .map(|v| format!("'{}'", escape_literal(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{column} IN ({list})"))
}

/// Array-membership predicate: `array_contains(col, value)`.
pub fn array_contains_u32(column: &str, value: u32) -> String {
    format!("array_contains({column}, {value})")
}

pub fn and_all(predicates: impl IntoIterator<Item = String>) -> Option<String> {
    let parts: Vec<String> = predicates.into_iter().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

/// Build the WHERE predicate for a [`MetadataFilter`] applied to a chunk or
/// catalog scan. `source_column` lets chunk queries filter on the parent
/// catalog's source path via a pre-resolved `catalog_id` instead, while
/// catalog queries filter on `source_path` directly — callers decide which
/// column name applies.
pub fn from_metadata_filter(filter: &MetadataFilter, source_column: &str) -> Option<String> {
    let mut predicates = Vec::new();

    if let Some(ref source_path) = filter.source_path {
        predicates.push(eq_string(source_column, source_path));
    }
    if let Some(category_id) = filter.category_id {
        predicates.push(array_contains_u32("category_ids", category_id));
    }
    if let Some(from) = filter.date_from {
        predicates.push(format!("created_at >= {from}"));
    }
    if let Some(to) = filter.date_to {
        predicates.push(format!("created_at <= {to}"));
    }
    if let Some(ref custom) = filter.custom {
        let mut keys: Vec<_> = custom.keys().collect();
        keys.sort();
        for key in keys {
            predicates.push(eq_string(key, &custom[key]));
        }
    }

    and_all(predicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn escapes_embedded_single_quotes() {
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
    }

    #[test]
    fn eq_string_is_escaped() {
        assert_eq!(eq_string("source_path", "a'b"), "source_path = 'a''b'");
    }

    #[test]
    fn in_u32_list_empty_is_none() {
        assert_eq!(in_u32_list("id", &[]), None);
    }

    #[test]
    fn in_u32_list_formats_comma_separated() {
        assert_eq!(in_u32_list("id", &[1, 2, 3]), Some("id IN (1, 2, 3)".to_string()));
    }

    #[test]
    fn metadata_filter_combines_with_and() {
        let mut custom = HashMap::new();
        custom.insert("lang".to_string(), "en".to_string());
        let filter = MetadataFilter {
            source_path: Some("docs/a.pdf".to_string()),
            category_id: Some(7),
            date_from: None,
            date_to: None,
            custom: Some(custom),
        };
        let predicate = from_metadata_filter(&filter, "source_path").unwrap();
        assert_eq!(
            predicate,
            "source_path = 'docs/a.pdf' AND array_contains(category_ids, 7) AND lang = 'en'"
        );
    }

    #[test]
    fn no_filters_yields_none() {
        assert_eq!(from_metadata_filter(&MetadataFilter::default(), "source_path"), None);
    }
}
