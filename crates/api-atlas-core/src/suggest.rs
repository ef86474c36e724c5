//! Similarity-ranked name suggestions for schema misses.

/// Default number of suggestions returned with a miss.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

/// Suggestions scoring below this are dropped.
const MIN_SCORE: f64 = 0.3;

/// Simple Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Similarity in `[0.0, 1.0]` between a requested name and a candidate.
///
/// Case-insensitive Levenshtein ratio, raised to at least `0.8` (scaled by
/// length ratio) when one name contains the other, so `Campaign` ranks
/// `CreateCampaignRequest` above unrelated names of similar length.
pub fn similarity(query: &str, candidate: &str) -> f64 {
    let q = query.to_lowercase();
    let c = candidate.to_lowercase();
    if q == c {
        return 1.0;
    }
    let max_len = q.chars().count().max(c.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let ratio = 1.0 - levenshtein(&q, &c) as f64 / max_len as f64;
    if !q.is_empty() && !c.is_empty() && (c.contains(&q) || q.contains(&c)) {
        let shorter = q.chars().count().min(c.chars().count()) as f64;
        let containment = 0.8 + 0.19 * (shorter / max_len as f64);
        ratio.max(containment)
    } else {
        ratio
    }
}

/// Up to `limit` candidates ranked by [`similarity`] (descending, ties by
/// name), excluding anything below the relevance floor.
pub fn suggest<'a, I>(query: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut scored: Vec<(f64, &String)> = candidates
        .into_iter()
        .map(|c| (similarity(query, c), c))
        .filter(|(s, _)| *s >= MIN_SCORE)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, c)| c.clone())
        .collect()
}
