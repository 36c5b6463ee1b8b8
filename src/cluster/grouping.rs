// src/cluster/grouping.rs
use crate::models::RawArticle;

/// Default similarity an article must exceed (strictly) to join a group.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Greedy seed grouping over `articles` in input order.
///
/// The first unassigned article seeds a group; every later unassigned article joins
/// it when its title or its summary is more similar than `threshold` to the seed's.
/// Articles are only compared against seeds, so membership is order dependent and
/// groups are never merged afterwards. Returns index groups, each led by its seed.
pub fn group_articles<F>(articles: &[RawArticle], threshold: f64, similarity: F) -> Vec<Vec<usize>>
where
    F: Fn(&str, &str) -> f64,
{
    let mut assigned = vec![false; articles.len()];
    let mut groups = Vec::new();

    for seed in 0..articles.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut group = vec![seed];

        for other in seed + 1..articles.len() {
            if assigned[other] {
                continue;
            }
            if is_similar(&articles[seed], &articles[other], threshold, &similarity) {
                assigned[other] = true;
                group.push(other);
            }
        }
        groups.push(group);
    }
    groups
}

fn is_similar<F>(a: &RawArticle, b: &RawArticle, threshold: f64, similarity: &F) -> bool
where
    F: Fn(&str, &str) -> f64,
{
    let matches = |x: &str, y: &str| !x.trim().is_empty() && !y.trim().is_empty() && similarity(x, y) > threshold;
    matches(&a.title, &b.title) || matches(&a.summary, &b.summary)
}
