//! crates/bookshelf_core/src/catalog.rs
//!
//! Pure helpers for reconciling a book's category membership. Storage adapters
//! use these so that every backend applies the same naming rules.

use crate::domain::Category;

/// Trims names, drops blanks and removes duplicates, keeping the first occurrence.
pub fn normalize_category_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || normalized.iter().any(|n| n == name) {
            continue;
        }
        normalized.push(name.to_string());
    }
    normalized
}

/// Returns the requested names that have no matching category yet.
pub fn missing_category_names(requested: &[String], existing: &[Category]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !existing.iter().any(|c| &c.name == *name))
        .cloned()
        .collect()
}

/// Case-insensitive substring match used by the search operation.
pub fn matches_query(haystack: &str, query: &str) -> bool {
    haystack.to_lowercase().contains(&query.to_lowercase())
}
