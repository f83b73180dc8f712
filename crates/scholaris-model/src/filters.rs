use crate::ids::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Filter conditions keyed by document field. Shapes mirror what the API
/// accepts: a scalar is an exact term, a list matches any value, and a map
/// holds range bounds such as `gte`/`lte`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Filters(pub BTreeMap<String, FilterValue>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Terms(Vec<Value>),
    Range(BTreeMap<String, Value>),
    Term(Value),
}

impl Filters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    pub fn insert(&mut self, field: &str, value: FilterValue) {
        self.0.insert(field.to_string(), value);
    }

    /// Year bounds must be non-negative integers; everything else passes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(condition) = self.0.get("publication_year") {
            match condition {
                FilterValue::Range(bounds) => {
                    for (bound, value) in bounds {
                        let year = coerce_year(value).ok_or_else(|| {
                            ValidationError(format!(
                                "publication_year bound '{bound}' must be an integer"
                            ))
                        })?;
                        if year < 0 {
                            return Err(ValidationError(
                                "publication year cannot be negative".to_string(),
                            ));
                        }
                    }
                }
                FilterValue::Term(value) => {
                    let year = coerce_year(value).ok_or_else(|| {
                        ValidationError("publication_year must be an integer".to_string())
                    })?;
                    if year < 0 {
                        return Err(ValidationError(
                            "publication year cannot be negative".to_string(),
                        ));
                    }
                }
                FilterValue::Terms(values) => {
                    for value in values {
                        let year = coerce_year(value).ok_or_else(|| {
                            ValidationError("publication_year must be an integer".to_string())
                        })?;
                        if year < 0 {
                            return Err(ValidationError(
                                "publication year cannot be negative".to_string(),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn coerce_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
