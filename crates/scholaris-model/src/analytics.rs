use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const TOP_KEYWORDS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub type_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Analytics {
    pub timeline: Vec<YearCount>,
    pub types: Vec<TypeCount>,
    pub keywords: Vec<ValueCount>,
}

/// Aggregates a hit set into a publication timeline, type counts, and the
/// most frequent keywords. Unparseable years are skipped.
#[must_use]
pub fn build_analytics(publications: &[Value]) -> Analytics {
    let mut years: HashMap<i32, u64> = HashMap::new();
    let mut types: HashMap<String, u64> = HashMap::new();
    let mut keywords: HashMap<String, u64> = HashMap::new();

    for publication in publications {
        if let Some(year) = parse_year(publication.get("publication_year")) {
            *years.entry(year).or_insert(0) += 1;
        }
        if let Some(type_name) = publication
            .get("publication_type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            *types.entry(type_name.to_string()).or_insert(0) += 1;
        }
        for keyword in keyword_values(publication.get("keywords")) {
            *keywords.entry(keyword).or_insert(0) += 1;
        }
    }

    let mut timeline: Vec<YearCount> = years
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect();
    timeline.sort_by_key(|entry| entry.year);

    let mut type_counts: Vec<TypeCount> = types
        .into_iter()
        .map(|(type_name, count)| TypeCount { type_name, count })
        .collect();
    type_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.type_name.cmp(&b.type_name)));

    let mut keyword_counts: Vec<ValueCount> = keywords
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    keyword_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    keyword_counts.truncate(TOP_KEYWORDS);

    Analytics {
        timeline,
        types: type_counts,
        keywords: keyword_counts,
    }
}

fn parse_year(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().map(|v| v as i32),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

fn keyword_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        // A bare string is one keyword, not a delimited list.
        Some(Value::String(single)) => {
            let trimmed = single.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
        _ => Vec::new(),
    }
}
