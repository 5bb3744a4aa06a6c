/// Heuristic query classification into exact, semantic or hybrid routes
use crate::types::Route;

/// Literal markers that force exact routing
const EXACT_MARKERS: [&str; 5] = ["exact:", "id:", "code:", "key:", "faq"];

/// Characters that make a short query look like an identifier
const ID_PUNCTUATION: [char; 3] = ['#', '_', '-'];

/// Queries shorter than this with id punctuation are treated as identifiers
const SHORT_QUERY_CHARS: usize = 20;

const MAX_EXACT_TOKENS: usize = 3;
const MIN_SEMANTIC_TOKENS: usize = 8;

const INTERROGATIVE_WORDS: [&str; 5] = ["how", "what", "why", "explain", "describe"];
const SIMILARITY_WORDS: [&str; 5] = ["similar", "like", "related", "about", "regarding"];

/// Map a raw query to a route; pure and deterministic
pub fn classify(query: &str) -> Route {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Route::Hybrid;
    }

    let lowered = trimmed.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    if is_exact(trimmed, &lowered, tokens.len()) {
        return Route::Exact;
    }

    if is_semantic(&lowered, &tokens) {
        return Route::Semantic;
    }

    Route::Hybrid
}

fn is_exact(trimmed: &str, lowered: &str, token_count: usize) -> bool {
    if token_count <= MAX_EXACT_TOKENS {
        return true;
    }

    if is_quoted(trimmed) {
        return true;
    }

    if EXACT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return true;
    }

    trimmed.chars().count() < SHORT_QUERY_CHARS
        && trimmed.chars().any(|c| ID_PUNCTUATION.contains(&c))
}

fn is_quoted(trimmed: &str) -> bool {
    trimmed.chars().count() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
}

fn is_semantic(lowered: &str, tokens: &[&str]) -> bool {
    if tokens.len() > MIN_SEMANTIC_TOKENS {
        return true;
    }

    let words: Vec<&str> = tokens
        .iter()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect();

    let has_word = |candidates: &[&str]| words.iter().any(|word| candidates.contains(word));

    has_word(&INTERROGATIVE_WORDS) || lowered.contains("tell me") || has_word(&SIMILARITY_WORDS)
}
