use crate::ids::{ArticleId, AuthorId, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EMBEDDING_DIM: usize = 384;

/// Fields removed from hits when callers ask for lite payloads.
pub const HEAVY_FIELDS: [&str; 3] = ["abstract", "references", "full_text"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Accepts only finite vectors of the model dimension.
    pub fn parse(values: Vec<f32>) -> Result<Self, ValidationError> {
        if values.len() != EMBEDDING_DIM {
            return Err(ValidationError(format!(
                "embedding must have {EMBEDDING_DIM} dimensions, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError(
                "embedding must not contain NaN or infinite values".to_string(),
            ));
        }
        Ok(Self(values))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    #[must_use]
    pub fn l2_normalized(mut self) -> Self {
        let norm = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut self.0 {
                *v /= norm;
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: String,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub authors: Vec<AuthorId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_units: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_subunits: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords_embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subunit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub art_num: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<ArticleId>,
}

/// Drops abstract, references, and full_text from a hit payload in place.
/// Keywords survive unless the caller opts out.
pub fn strip_heavy(hit: &mut Value, keep_keywords: bool) {
    if let Value::Object(map) = hit {
        for field in HEAVY_FIELDS {
            map.remove(field);
        }
        if !keep_keywords {
            map.remove("keywords");
        }
    }
}
