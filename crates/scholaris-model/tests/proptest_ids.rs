use proptest::prelude::*;
use scholaris_model::{ArticleId, Embedding, EMBEDDING_DIM};

proptest! {
    #[test]
    fn article_id_parse_never_panics(input in ".*") {
        let _ = ArticleId::parse(&input);
    }

    #[test]
    fn parsed_article_ids_are_trimmed_and_compact(input in "[A-Za-z0-9_.-]{1,64}") {
        let padded = format!("  {input}  ");
        let id = ArticleId::parse(&padded).expect("compact ids parse");
        prop_assert_eq!(id.as_str(), input.as_str());
    }

    #[test]
    fn nonzero_embeddings_normalize_to_unit_norm(
        values in proptest::collection::vec(-100.0f32..100.0, EMBEDDING_DIM)
    ) {
        prop_assume!(values.iter().any(|v| v.abs() > 1e-3));
        let normalized = Embedding::parse(values).expect("finite").l2_normalized();
        let norm: f32 = normalized.as_slice().iter().map(|v| v * v).sum::<f32>().sqrt();
        prop_assert!((norm - 1.0).abs() < 1e-3);
    }
}
