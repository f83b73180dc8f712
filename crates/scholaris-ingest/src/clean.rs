// SPDX-License-Identifier: Apache-2.0

//! Raw export cleaning. Records without the required identity fields are
//! dropped, whitespace is collapsed, and LaTeX-style chemical markup in
//! titles, abstracts and keywords is flattened to plain text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

/// Harvester placeholder for an absent abstract, compared case-insensitively.
const PLACEHOLDER_ABSTRACT: &str = "Brak abstraktu";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanOutcome {
    pub records: Vec<Value>,
    pub skipped: usize,
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

fn math_span_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\${1,2}(.*?)\${1,2}").expect("math span regex"))
}

fn subscript_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z])_(\d+)").expect("subscript regex"))
}

fn clean_text(raw: &str) -> String {
    whitespace_re().replace_all(raw.trim(), " ").into_owned()
}

fn clean_abstract(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(PLACEHOLDER_ABSTRACT) {
        return String::new();
    }
    clean_text(trimmed)
}

/// Flattens `$...$` and `$$...$$` spans: subscripts like `H_2` collapse to
/// `H2`, underscores and braces inside the span are dropped, and any
/// remaining `$` delimiters are removed.
#[must_use]
pub fn normalize_latex(text: &str) -> String {
    let replaced = math_span_re().replace_all(text, |caps: &regex::Captures<'_>| {
        let inner = subscript_re().replace_all(&caps[1], "$1$2");
        inner.replace(['_', '{', '}'], "")
    });
    replaced.replace('$', "")
}

fn string_field(record: &Value, field: &str) -> String {
    record.get(field).and_then(Value::as_str).unwrap_or("").to_string()
}

/// Cleans one raw article export. Records without id or title are dropped
/// and counted.
pub fn clean_articles(raw: &[Value]) -> CleanOutcome {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for record in raw {
        let id = string_field(record, "id");
        let title = string_field(record, "title");
        if id.trim().is_empty() || title.trim().is_empty() {
            skipped += 1;
            continue;
        }

        let keywords: Vec<String> = record
            .get("keywords")
            .and_then(Value::as_array)
            .map(|kws| {
                kws.iter()
                    .filter_map(Value::as_str)
                    .map(clean_text)
                    .filter(|kw| !kw.is_empty())
                    .map(|kw| normalize_latex(&kw))
                    .collect()
            })
            .unwrap_or_default();

        records.push(json!({
            "id": id,
            "url": string_field(record, "url"),
            "title": normalize_latex(&clean_text(&title)),
            "abstract": normalize_latex(&clean_abstract(&string_field(record, "abstract"))),
            "keywords": keywords,
            "authors": record.get("authors").cloned().unwrap_or_else(|| json!([])),
            "publication_year": record.get("publication_year").cloned().unwrap_or(Value::Null),
            "publication_type": string_field(record, "publication_type"),
        }));
    }
    info!(cleaned = records.len(), skipped, "cleaned article export");
    CleanOutcome { records, skipped }
}

/// Cleans one raw author export. Records without id or full_name are
/// dropped and counted.
pub fn clean_authors(raw: &[Value]) -> CleanOutcome {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for record in raw {
        let id = string_field(record, "id");
        let full_name = string_field(record, "full_name");
        if id.trim().is_empty() || full_name.trim().is_empty() {
            skipped += 1;
            continue;
        }
        records.push(json!({
            "id": id,
            "full_name": clean_text(&full_name),
            "unit": clean_text(&string_field(record, "unit")),
            "subunit": clean_text(&string_field(record, "subunit")),
            "art_num": record.get("art_num").cloned().unwrap_or(json!(0)),
        }));
    }
    info!(cleaned = records.len(), skipped, "cleaned author export");
    CleanOutcome { records, skipped }
}
