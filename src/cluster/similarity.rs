// src/cluster/similarity.rs
//! Token-set similarity on a 0.0..=1.0 scale.
//!
//! Both strings are lowercased and split into alphanumeric tokens. With `I` the
//! sorted intersection and `D1`/`D2` the sorted differences, the score is the best
//! normalized Levenshtein ratio among `(I, I+D1)`, `(I, I+D2)` and `(I+D1, I+D2)`.
//! A string that is a token subset of the other therefore scores 1.0.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

fn tokens(s: &str) -> BTreeSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn joined<'a>(parts: impl IntoIterator<Item = &'a String>) -> String {
    parts
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sect = joined(ta.intersection(&tb));
    let diff_ab = joined(ta.difference(&tb));
    let diff_ba = joined(tb.difference(&ta));

    let combine = |diff: &str| {
        if sect.is_empty() {
            diff.to_string()
        } else if diff.is_empty() {
            sect.clone()
        } else {
            format!("{sect} {diff}")
        }
    };
    let comb_ab = combine(&diff_ab);
    let comb_ba = combine(&diff_ba);

    let mut best = normalized_levenshtein(&comb_ab, &comb_ba);
    if !sect.is_empty() {
        best = best
            .max(normalized_levenshtein(&sect, &comb_ab))
            .max(normalized_levenshtein(&sect, &comb_ba));
    }
    best
}
