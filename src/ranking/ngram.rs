//! Word-boundary character n-grams.

use std::collections::HashMap;

/// Character n-grams of every whitespace-separated word, each padded with a
/// single space on both sides. A word shorter than `n` contributes itself once.
pub fn char_wb_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut grams = Vec::new();
    let lowered = text.to_lowercase();

    for word in lowered.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        let len = padded.len();

        for n in min_n..=max_n {
            if n == 0 {
                continue;
            }
            let mut offset = 0;
            grams.push(padded[offset..(offset + n).min(len)].iter().collect());
            while offset + n < len {
                offset += 1;
                grams.push(padded[offset..offset + n].iter().collect());
            }
            if offset == 0 {
                break;
            }
        }
    }

    grams
}

/// Sparse count vector over `vocabulary`; unknown n-grams are ignored.
pub fn count_features(
    text: &str,
    min_n: usize,
    max_n: usize,
    vocabulary: &HashMap<String, usize>,
) -> HashMap<usize, f64> {
    let mut counts = HashMap::new();
    for gram in char_wb_ngrams(text, min_n, max_n) {
        if let Some(&index) = vocabulary.get(&gram) {
            *counts.entry(index).or_insert(0.0) += 1.0;
        }
    }
    counts
}
