/// Result-set quality assessment
///
/// The verdict is advisory metadata only; the result list is never altered.
use crate::types::{QualityLevel, QualityVerdict, SearchResult};
use std::collections::HashSet;

/// Score thresholds for each quality level as (max, avg, confidence)
const EXCELLENT: (f32, f32, f32) = (0.9, 0.7, 0.95);
const GOOD: (f32, f32, f32) = (0.7, 0.5, 0.8);
const FAIR: (f32, f32, f32) = (0.5, 0.3, 0.6);
const POOR_CONFIDENCE: f32 = 0.3;

const FALLBACK_HINT_AVG: f32 = 0.5;
const MIN_UNIQUE_SOURCES: usize = 2;
const MIN_AVG_CONTENT_CHARS: f32 = 50.0;

/// Assess a final result list
pub fn assess(results: &[SearchResult], _query: &str) -> QualityVerdict {
    if results.is_empty() {
        return QualityVerdict {
            level: QualityLevel::NoResults,
            confidence: 0.0,
            avg_score: 0.0,
            max_score: 0.0,
            unique_sources: 0,
            unique_types: 0,
            avg_content_length: 0.0,
            recommendations: vec!["try_broader_terms".to_string(), "check_spelling".to_string()],
        };
    }

    let count = results.len() as f32;
    let avg_score = results.iter().map(|r| r.score).sum::<f32>() / count;
    let max_score = results
        .iter()
        .map(|r| r.score)
        .fold(f32::NEG_INFINITY, f32::max);
    let unique_sources = results
        .iter()
        .map(|r| r.source.as_str())
        .collect::<HashSet<_>>()
        .len();
    let unique_types = results.iter().map(|r| r.kind).collect::<HashSet<_>>().len();
    let avg_content_length = results
        .iter()
        .map(|r| r.content.chars().count() as f32)
        .sum::<f32>()
        / count;

    let (level, confidence) = if max_score > EXCELLENT.0 && avg_score > EXCELLENT.1 {
        (QualityLevel::Excellent, EXCELLENT.2)
    } else if max_score > GOOD.0 && avg_score > GOOD.1 {
        (QualityLevel::Good, GOOD.2)
    } else if max_score > FAIR.0 && avg_score > FAIR.1 {
        (QualityLevel::Fair, FAIR.2)
    } else {
        (QualityLevel::Poor, POOR_CONFIDENCE)
    };

    let mut recommendations = Vec::new();
    if avg_score < FALLBACK_HINT_AVG {
        recommendations.push("consider_fallback_search".to_string());
    }
    if unique_sources < MIN_UNIQUE_SOURCES {
        recommendations.push("diversify_sources".to_string());
    }
    if avg_content_length < MIN_AVG_CONTENT_CHARS {
        recommendations.push("expand_content".to_string());
    }

    QualityVerdict {
        level,
        confidence,
        avg_score,
        max_score,
        unique_sources,
        unique_types,
        avg_content_length,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{score_metrics, source_tags, KnowledgeRecord};

    fn result(source: &str, score: f32, content: &str) -> SearchResult {
        KnowledgeRecord::document_chunk("7", 0, "Guide", content).into_result(
            score,
            source,
            score_metrics::COSINE,
        )
    }

    #[test]
    fn test_empty_results() {
        let verdict = assess(&[], "anything");
        assert_eq!(verdict.level, QualityLevel::NoResults);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.recommendations, vec!["try_broader_terms", "check_spelling"]);
    }

    #[test]
    fn test_excellent_with_diverse_sources() {
        let long = "Detailed onboarding instructions covering account setup and roles.";
        let results = vec![
            result(source_tags::VECTOR_INDEX, 0.95, long),
            result(source_tags::TEXT_INDEX, 0.95, long),
        ];
        let verdict = assess(&results, "onboarding");
        assert_eq!(verdict.level, QualityLevel::Excellent);
        assert_eq!(verdict.confidence, 0.95);
        assert_eq!(verdict.unique_sources, 2);
        assert!(verdict.recommendations.is_empty());
    }

    #[test]
    fn test_level_thresholds() {
        let text = "x".repeat(80);
        let good = assess(&[result("a", 0.8, &text), result("b", 0.6, &text)], "q");
        assert_eq!(good.level, QualityLevel::Good);

        let fair = assess(&[result("a", 0.6, &text), result("b", 0.3, &text)], "q");
        assert_eq!(fair.level, QualityLevel::Fair);
        assert!(fair.recommendations.contains(&"consider_fallback_search".to_string()));

        let poor = assess(&[result("a", 0.2, "short")], "q");
        assert_eq!(poor.level, QualityLevel::Poor);
        assert_eq!(poor.confidence, 0.3);
        assert_eq!(
            poor.recommendations,
            vec!["consider_fallback_search", "diversify_sources", "expand_content"]
        );
    }

    #[test]
    fn test_assessment_does_not_touch_results() {
        let results = vec![result("a", 0.1, "first"), result("b", 0.9, "second")];
        let before = results.clone();
        let _ = assess(&results, "q");
        assert_eq!(results, before);
    }
}
