/// Deduplication and re-ranking of pooled results
///
/// Results from every adapter and corpus are sorted by score, then walked
/// greedily: a result is dropped when its identity or its content
/// fingerprint has already been accepted. The walk stops at `top_k`.
use crate::types::SearchResult;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Sort by score descending (stable), drop duplicates, truncate to `top_k`
pub fn dedupe_and_rank(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    let input_len = results.len();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut seen_identities: HashSet<String> = HashSet::new();
    let mut seen_fingerprints: HashSet<String> = HashSet::new();
    let mut ranked = Vec::with_capacity(top_k.min(input_len));

    for result in results {
        if ranked.len() >= top_k {
            break;
        }

        let identity = result.identity_key().map(str::to_string);
        let fingerprint = result.fingerprint();

        let duplicate_identity = identity
            .as_ref()
            .is_some_and(|id| seen_identities.contains(id));
        let duplicate_content = fingerprint
            .as_ref()
            .is_some_and(|fp| seen_fingerprints.contains(fp));
        if duplicate_identity || duplicate_content {
            continue;
        }

        if let Some(identity) = identity {
            seen_identities.insert(identity);
        }
        if let Some(fingerprint) = fingerprint {
            seen_fingerprints.insert(fingerprint);
        }
        ranked.push(result);
    }

    debug!(
        "Deduplicated {} candidates into {} results (top_k={})",
        input_len,
        ranked.len(),
        top_k
    );

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{score_metrics, source_tags, KnowledgeRecord};

    fn doc(id: &str, chunk: u32, content: &str, score: f32, source: &str) -> SearchResult {
        KnowledgeRecord::document_chunk(id, chunk, "Guide", content).into_result(
            score,
            source,
            score_metrics::COSINE,
        )
    }

    #[test]
    fn test_duplicate_identity_is_suppressed() {
        let results = vec![
            doc("42", 0, "Install the agent", 0.7, source_tags::TEXT_INDEX),
            doc("42", 0, "Install the agent first", 0.9, source_tags::VECTOR_INDEX),
            doc("43", 1, "Configure the proxy", 0.5, source_tags::VECTOR_INDEX),
        ];

        let ranked = dedupe_and_rank(results, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].identity.as_deref(), Some("doc:42:chunk:0"));
        assert_eq!(ranked[0].source, source_tags::VECTOR_INDEX);
        assert_eq!(ranked[1].identity.as_deref(), Some("doc:43:chunk:1"));
    }

    #[test]
    fn test_duplicate_content_without_identity() {
        let mut first = doc("1", 0, "Same body text", 0.8, "a");
        let mut second = doc("2", 0, "  Same body text  ", 0.6, "b");
        first.identity = None;
        second.identity = None;

        let ranked = dedupe_and_rank(vec![first, second], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.8);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let results = vec![
            doc("1", 0, "alpha", 0.5, "a"),
            doc("2", 0, "beta", 0.5, "a"),
            doc("3", 0, "gamma", 0.5, "a"),
        ];
        let ranked = dedupe_and_rank(results, 2);
        let ids: Vec<_> = ranked.iter().filter_map(|r| r.identity.as_deref()).collect();
        assert_eq!(ids, vec!["doc:1:chunk:0", "doc:2:chunk:0"]);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let results = vec![
            doc("1", 0, "alpha", 0.2, "a"),
            doc("1", 0, "alpha again", 0.9, "b"),
            doc("2", 0, "beta", 0.4, "a"),
            doc("3", 0, "beta", 0.6, "c"),
            doc("4", 0, "delta", 0.6, "c"),
        ];
        let once = dedupe_and_rank(results, 5);
        let twice = dedupe_and_rank(once.clone(), 5);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_top_k_bound() {
        let results: Vec<_> = (0..20)
            .map(|i| doc(&i.to_string(), 0, &format!("content {}", i), i as f32 / 20.0, "a"))
            .collect();
        let ranked = dedupe_and_rank(results, 3);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
