//! Per-cluster summaries assembled from labeled publications.

use serde::Serialize;
use serde_json::Value;

const TOP_KEYWORDS: usize = 10;
const SAMPLE_TITLES: usize = 5;

/// One labeled cluster, ready for serialization. `keywords` entries
/// serialize as `[keyword, count]` pairs.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub id: i32,
    pub publications: Vec<String>,
    pub points: Vec<[f64; 2]>,
    pub keywords: Vec<(String, u64)>,
    pub size: usize,
    pub years: YearSpan,
    pub sample_titles: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct YearSpan {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

/// Groups samples by label, skipping noise (negative labels). Clusters
/// keep the order their labels first appear in, then sort by size
/// descending; the sort is stable so equal sizes stay in label order.
#[must_use]
pub fn build_summaries(
    ids: &[String],
    sources: &[&Value],
    points: &[[f64; 2]],
    labels: &[i32],
) -> Vec<ClusterSummary> {
    debug_assert_eq!(ids.len(), sources.len());
    debug_assert_eq!(ids.len(), points.len());
    debug_assert_eq!(ids.len(), labels.len());

    let mut order: Vec<i32> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, &label) in labels.iter().enumerate() {
        if label < 0 {
            continue;
        }
        match order.iter().position(|&seen| seen == label) {
            Some(slot) => groups[slot].push(index),
            None => {
                order.push(label);
                groups.push(vec![index]);
            }
        }
    }

    let mut summaries: Vec<ClusterSummary> = order
        .into_iter()
        .zip(groups)
        .map(|(label, members)| ClusterSummary {
            id: label,
            publications: members.iter().map(|&i| ids[i].clone()).collect(),
            points: members.iter().map(|&i| points[i]).collect(),
            keywords: top_keywords(&members, sources),
            size: members.len(),
            years: year_span(&members, sources),
            sample_titles: members
                .iter()
                .take(SAMPLE_TITLES)
                .map(|&i| {
                    sources[i]
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned()
                })
                .collect(),
        })
        .collect();

    summaries.sort_by(|a, b| b.size.cmp(&a.size));
    summaries
}

/// Counts keyword occurrences across members. Only list-valued keyword
/// fields participate; a bare string field is not a keyword list here.
fn top_keywords(members: &[usize], sources: &[&Value]) -> Vec<(String, u64)> {
    let mut seen: Vec<String> = Vec::new();
    let mut counts: Vec<u64> = Vec::new();
    for &index in members {
        let Some(Value::Array(keywords)) = sources[index].get("keywords") else {
            continue;
        };
        for keyword in keywords {
            let Some(keyword) = keyword.as_str() else {
                continue;
            };
            match seen.iter().position(|s| s == keyword) {
                Some(slot) => counts[slot] += 1,
                None => {
                    seen.push(keyword.to_owned());
                    counts.push(1);
                }
            }
        }
    }

    let mut pairs: Vec<(String, u64)> = seen.into_iter().zip(counts).collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));
    pairs.truncate(TOP_KEYWORDS);
    pairs
}

fn year_span(members: &[usize], sources: &[&Value]) -> YearSpan {
    let mut span = YearSpan::default();
    for &index in members {
        let Some(year) = publication_year(sources[index]) else {
            continue;
        };
        span.min = Some(span.min.map_or(year, |current| current.min(year)));
        span.max = Some(span.max.map_or(year, |current| current.max(year)));
    }
    span
}

/// Zero and empty values are treated as absent, matching the loose
/// source data where 0 stands in for "unknown year".
fn publication_year(source: &Value) -> Option<i32> {
    match source.get("publication_year") {
        Some(Value::Number(number)) => {
            let year = number.as_i64()?;
            i32::try_from(year).ok().filter(|&y| y != 0)
        }
        Some(Value::String(text)) => text.trim().parse::<i32>().ok().filter(|&y| y != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixtures() -> (Vec<String>, Vec<Value>, Vec<[f64; 2]>) {
        let ids = vec![
            "a".to_owned(),
            "b".to_owned(),
            "c".to_owned(),
            "d".to_owned(),
            "e".to_owned(),
        ];
        let sources = vec![
            json!({"title": "Graphene oxide", "keywords": ["graphene", "oxide"], "publication_year": 2019}),
            json!({"title": "Catalyst survey", "keywords": ["catalysis"], "publication_year": 2021}),
            json!({"keywords": "graphene", "publication_year": 0}),
            json!({"title": "Graphene layers", "keywords": ["graphene"], "publication_year": "2017"}),
            json!({"title": "Unrelated", "publication_year": 2020}),
        ];
        let points = vec![[0.0, 0.0], [1.0, 1.0], [0.1, 0.1], [0.2, 0.2], [5.0, 5.0]];
        (ids, sources, points)
    }

    #[test]
    fn clusters_sort_by_size_and_keep_member_order() {
        let (ids, sources, points) = fixtures();
        let refs: Vec<&Value> = sources.iter().collect();
        let labels = vec![0, 1, 0, 0, 1];
        let summaries = build_summaries(&ids, &refs, &points, &labels);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 0);
        assert_eq!(summaries[0].size, 3);
        assert_eq!(summaries[0].publications, vec!["a", "c", "d"]);
        assert_eq!(summaries[0].points, vec![[0.0, 0.0], [0.1, 0.1], [0.2, 0.2]]);
        assert_eq!(summaries[1].id, 1);
        assert_eq!(summaries[1].publications, vec!["b", "e"]);
    }

    #[test]
    fn keywords_count_only_list_fields() {
        let (ids, sources, points) = fixtures();
        let refs: Vec<&Value> = sources.iter().collect();
        let labels = vec![0, 0, 0, 0, 0];
        let summaries = build_summaries(&ids, &refs, &points, &labels);

        // "graphene" appears in two list fields; the bare-string field
        // on the third publication does not count.
        assert_eq!(summaries[0].keywords[0], ("graphene".to_owned(), 2));
        assert!(summaries[0]
            .keywords
            .iter()
            .all(|(keyword, _)| keyword != "unrelated"));
    }

    #[test]
    fn years_skip_zero_and_accept_strings() {
        let (ids, sources, points) = fixtures();
        let refs: Vec<&Value> = sources.iter().collect();
        let labels = vec![0, 0, 0, 0, 0];
        let summaries = build_summaries(&ids, &refs, &points, &labels);
        assert_eq!(summaries[0].years.min, Some(2017));
        assert_eq!(summaries[0].years.max, Some(2021));
    }

    #[test]
    fn missing_years_leave_null_bounds() {
        let ids = vec!["x".to_owned(), "y".to_owned(), "z".to_owned()];
        let sources = vec![json!({}), json!({"publication_year": 0}), json!({})];
        let refs: Vec<&Value> = sources.iter().collect();
        let points = vec![[0.0, 0.0]; 3];
        let summaries = build_summaries(&ids, &refs, &points, &[0, 0, 0]);
        assert_eq!(summaries[0].years.min, None);
        assert_eq!(summaries[0].years.max, None);
    }

    #[test]
    fn noise_labels_are_dropped() {
        let (ids, sources, points) = fixtures();
        let refs: Vec<&Value> = sources.iter().collect();
        let labels = vec![0, -1, 0, -1, 1];
        let summaries = build_summaries(&ids, &refs, &points, &labels);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].publications, vec!["a", "c"]);
        assert_eq!(summaries[1].publications, vec!["e"]);
    }

    #[test]
    fn sample_titles_cap_at_five_with_defaults() {
        let ids: Vec<String> = (0..7).map(|i| format!("p{i}")).collect();
        let sources: Vec<Value> = (0..7)
            .map(|i| {
                if i == 2 {
                    json!({})
                } else {
                    json!({"title": format!("Title {i}")})
                }
            })
            .collect();
        let refs: Vec<&Value> = sources.iter().collect();
        let points = vec![[0.0, 0.0]; 7];
        let summaries = build_summaries(&ids, &refs, &points, &[0; 7]);
        assert_eq!(
            summaries[0].sample_titles,
            vec!["Title 0", "Title 1", "", "Title 3", "Title 4"]
        );
    }
}
