use crate::filters::build_filter_clauses;
use scholaris_model::{ArticleId, AuthorId, Filters};
use serde_json::{json, Value};

/// Batch width for `terms` lookups over explicit publication id lists.
pub const PUBLICATION_ID_BATCH: usize = 500;

/// How to materialize an author's publication list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorPublicationsPlan {
    /// Scroll every article whose `authors` field carries the author id.
    ScrollAll,
    /// The author document names its article ids; fetch the requested slice.
    IdSubset { ids: Vec<ArticleId> },
    /// One paged query sorted by publication year, newest first.
    Paged { size: usize, from: usize },
}

/// Picks the fetch strategy for an author's publications.
///
/// A request for everything (no size, or size zero) scrolls. A first-page
/// request that spans the whole stored id list also scrolls when the
/// author's article count says that list is incomplete. Otherwise the
/// stored ids are sliced directly, with a paged term query as the last
/// resort for authors that carry no id list at all.
#[must_use]
pub fn plan_author_publications(
    publications: &[ArticleId],
    art_num: i64,
    size: Option<usize>,
    from: usize,
) -> AuthorPublicationsPlan {
    let requested = size.filter(|s| *s > 0);

    if let Some(size) = requested {
        if from == 0
            && !publications.is_empty()
            && size >= publications.len()
            && art_num > publications.len() as i64
        {
            return AuthorPublicationsPlan::ScrollAll;
        }
    }

    let Some(size) = requested else {
        return AuthorPublicationsPlan::ScrollAll;
    };

    if !publications.is_empty() {
        let start = from.min(publications.len());
        let end = from.saturating_add(size).min(publications.len());
        return AuthorPublicationsPlan::IdSubset {
            ids: publications[start..end].to_vec(),
        };
    }

    AuthorPublicationsPlan::Paged { size, from }
}

fn authored_by_query(author_id: &AuthorId, filters: &Filters) -> Value {
    let term = json!({"term": {"authors": author_id.as_str()}});
    let clauses = build_filter_clauses(filters);
    if clauses.is_empty() {
        term
    } else {
        json!({"bool": {"must": [term], "filter": clauses}})
    }
}

/// Fetch one batch of articles by explicit id list.
#[must_use]
pub fn publications_by_ids_body(ids: &[ArticleId], filters: &Filters) -> Value {
    let id_values: Vec<&str> = ids.iter().map(ArticleId::as_str).collect();
    let terms = json!({"terms": {"id": id_values}});
    let clauses = build_filter_clauses(filters);
    let query = if clauses.is_empty() {
        terms
    } else {
        json!({"bool": {"must": [terms], "filter": clauses}})
    };
    json!({"size": ids.len(), "query": query})
}

/// Paged author publications, newest year first.
#[must_use]
pub fn paged_publications_body(
    author_id: &AuthorId,
    size: usize,
    from: usize,
    filters: &Filters,
) -> Value {
    json!({
        "size": size,
        "from": from,
        "query": authored_by_query(author_id, filters),
        "sort": [{"publication_year": {"order": "desc"}}]
    })
}

/// Query part for scrolling everything an author wrote; the scroll helper
/// owns paging and sort.
#[must_use]
pub fn scroll_publications_query(author_id: &AuthorId, filters: &Filters) -> Value {
    authored_by_query(author_id, filters)
}

/// Point lookup of an article by its application-level id field.
#[must_use]
pub fn article_by_id_body(id: &ArticleId) -> Value {
    json!({"query": {"term": {"id": id.as_str()}}})
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_ids(raw: &[&str]) -> Vec<ArticleId> {
        raw.iter()
            .map(|id| ArticleId::parse(id).expect("valid article id"))
            .collect()
    }

    #[test]
    fn missing_or_zero_size_scrolls_everything() {
        let ids = article_ids(&["a1", "a2"]);
        assert_eq!(
            plan_author_publications(&ids, 2, None, 0),
            AuthorPublicationsPlan::ScrollAll
        );
        assert_eq!(
            plan_author_publications(&ids, 2, Some(0), 0),
            AuthorPublicationsPlan::ScrollAll
        );
    }

    #[test]
    fn stale_id_list_scrolls_on_first_page() {
        // Two stored ids, five articles on record: the list is missing
        // three, and a size that covers the list must not trust it.
        let ids = article_ids(&["a1", "a2"]);
        assert_eq!(
            plan_author_publications(&ids, 5, Some(10), 0),
            AuthorPublicationsPlan::ScrollAll
        );
        // A later page never triggers the scroll.
        assert!(matches!(
            plan_author_publications(&ids, 5, Some(10), 2),
            AuthorPublicationsPlan::IdSubset { .. }
        ));
        // Neither does a size smaller than the list.
        assert!(matches!(
            plan_author_publications(&ids, 5, Some(1), 0),
            AuthorPublicationsPlan::IdSubset { .. }
        ));
    }

    #[test]
    fn complete_id_list_is_sliced() {
        let ids = article_ids(&["a1", "a2", "a3", "a4"]);
        let plan = plan_author_publications(&ids, 4, Some(2), 1);
        assert_eq!(
            plan,
            AuthorPublicationsPlan::IdSubset {
                ids: article_ids(&["a2", "a3"])
            }
        );
        // Out-of-range offsets clamp to an empty slice rather than failing.
        assert_eq!(
            plan_author_publications(&ids, 4, Some(2), 9),
            AuthorPublicationsPlan::IdSubset { ids: Vec::new() }
        );
    }

    #[test]
    fn no_id_list_pages_by_term() {
        assert_eq!(
            plan_author_publications(&[], 7, Some(10), 20),
            AuthorPublicationsPlan::Paged { size: 10, from: 20 }
        );
    }

    #[test]
    fn paged_body_sorts_by_year_desc() {
        let author = AuthorId::parse("auth-1").expect("valid author id");
        let body = paged_publications_body(&author, 10, 0, &Filters::default());
        assert_eq!(body["sort"][0]["publication_year"]["order"], "desc");
        assert_eq!(body["query"]["term"]["authors"], "auth-1");
    }

    #[test]
    fn filters_wrap_the_term_query() {
        let author = AuthorId::parse("auth-1").expect("valid author id");
        let filters: Filters =
            serde_json::from_value(json!({"publication_year": 2021})).expect("filters decode");
        let body = paged_publications_body(&author, 10, 0, &filters);
        assert_eq!(body["query"]["bool"]["must"][0]["term"]["authors"], "auth-1");
        assert!(body["query"]["bool"]["filter"].is_array());
    }

    #[test]
    fn ids_batch_body_carries_every_id() {
        let ids = article_ids(&["a1", "a2", "a3"]);
        let body = publications_by_ids_body(&ids, &Filters::default());
        assert_eq!(body["size"], 3);
        assert_eq!(body["query"]["terms"]["id"], json!(["a1", "a2", "a3"]));
    }
}
