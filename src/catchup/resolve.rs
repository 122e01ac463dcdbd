use crate::error::CatchupError;
use serde::Serialize;

/// Minimum fuzzy similarity for a candidate to count as a match at all.
const FUZZY_THRESHOLD: f64 = 0.6;
/// Candidates scoring within this margin of the best are treated as tied.
const TIE_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatIdentity {
    pub id: i64,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCandidate {
    pub identity: ChatIdentity,
    pub last_active_epoch_secs: Option<u64>,
}

/// Match quality tiers. An exact substring hit always outranks a fuzzy hit
/// regardless of edit distance, so the tier compares before the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchTier {
    Fuzzy,
    Substring,
    Exact,
}

#[derive(Debug, Clone, Copy)]
struct MatchScore {
    tier: MatchTier,
    score: f64,
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let sub_cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j] + sub_cost)
                .min(prev[j + 1] + 1)
                .min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn score_candidate(query_norm: &str, name: &str) -> Option<MatchScore> {
    let name_norm = normalize_name(name);
    if name_norm.is_empty() {
        return None;
    }

    if name_norm == query_norm {
        return Some(MatchScore {
            tier: MatchTier::Exact,
            score: 1.0,
        });
    }

    if name_norm.contains(query_norm) || query_norm.contains(&name_norm) {
        // Longer coverage of the candidate name scores higher so that
        // `squad` prefers `Squad` over `Squad Planning Archive 2019`.
        let coverage = query_norm.len().min(name_norm.len()) as f64
            / query_norm.len().max(name_norm.len()) as f64;
        return Some(MatchScore {
            tier: MatchTier::Substring,
            score: coverage,
        });
    }

    let distance = levenshtein(query_norm, &name_norm);
    let longest = query_norm.chars().count().max(name_norm.chars().count());
    let similarity = 1.0 - (distance as f64 / longest as f64);
    if similarity < FUZZY_THRESHOLD {
        return None;
    }
    Some(MatchScore {
        tier: MatchTier::Fuzzy,
        score: similarity,
    })
}

/// Resolve a user-supplied (possibly partial) chat name against the known
/// candidates.
///
/// Policy: best score wins; top scores tied within a small margin fall back
/// to the most recently active chat, then to the lowest chat id so the
/// outcome stays deterministic. `Ambiguous` is returned only when the tied
/// candidates carry no recency signal at all.
pub fn resolve_chat(
    query: &str,
    candidates: &[ChatCandidate],
) -> Result<ChatIdentity, CatchupError> {
    let query_norm = normalize_name(query);
    if query_norm.is_empty() {
        return Err(CatchupError::NotFound(query.to_string()));
    }

    let mut scored: Vec<(MatchScore, &ChatCandidate)> = candidates
        .iter()
        .filter_map(|c| score_candidate(&query_norm, &c.identity.display_name).map(|s| (s, c)))
        .collect();
    if scored.is_empty() {
        return Err(CatchupError::NotFound(query.to_string()));
    }

    scored.sort_by(|(sa, ca), (sb, cb)| {
        sb.tier
            .cmp(&sa.tier)
            .then(sb.score.total_cmp(&sa.score))
            .then(cb.last_active_epoch_secs.cmp(&ca.last_active_epoch_secs))
            .then(ca.identity.id.cmp(&cb.identity.id))
    });

    let (best_score, best) = scored[0];
    let tied: Vec<&ChatCandidate> = scored
        .iter()
        .filter(|(s, _)| s.tier == best_score.tier && (best_score.score - s.score) <= TIE_MARGIN)
        .map(|(_, c)| *c)
        .collect();

    if tied.len() > 1 && tied.iter().all(|c| c.last_active_epoch_secs.is_none()) {
        return Err(CatchupError::Ambiguous(query.to_string()));
    }

    Ok(best.identity.clone())
}
