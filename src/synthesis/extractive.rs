//! Extractive summarization
//!
//! Produces an answer by selecting and reordering existing sentences:
//! frequency-weighted sentence scoring with a positional boost, no
//! generative dependency.

use ahash::AHashMap;

/// Sentences at or below this length are treated as fragments and dropped.
const MIN_SENTENCE_LEN: usize = 20;
/// Sentences starting in this leading fraction of the text score higher.
const LEAD_FRACTION: f64 = 0.3;
/// Multiplier applied to leading sentences.
const LEAD_BOOST: f64 = 1.2;
/// Length cap for the degraded raw-text fallback.
const FALLBACK_CHARS: usize = 500;

struct Sentence {
    text: String,
    /// Character offset of the sentence start in the combined text
    position: usize,
    words: usize,
}

/// Select the `max_sentences` highest-scoring sentences of `combined` and
/// join them in original order.
///
/// Scoring: for each sentence, the sum of global word frequencies of its
/// words divided by its word count, multiplied by 1.2 when the sentence lies
/// in the first 30% of the text. When no sentence survives the fragment
/// filter, the trimmed text itself (truncated) is returned so callers always
/// get something readable from non-empty input.
pub fn extract_summary(combined: &str, max_sentences: usize) -> String {
    let trimmed = combined.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let sentences = split_sentences(trimmed);
    if sentences.is_empty() {
        return truncate_chars(trimmed, FALLBACK_CHARS);
    }

    let frequencies = word_frequencies(trimmed);
    let total_chars = trimmed.chars().count();
    let lead_cutoff = (total_chars as f64 * LEAD_FRACTION) as usize;

    let mut scored: Vec<(f64, &Sentence)> = sentences
        .iter()
        .map(|sentence| {
            let sum: f64 = words_of(&sentence.text)
                .map(|w| *frequencies.get(&w).unwrap_or(&0) as f64)
                .sum();
            let mut score = if sentence.words > 0 {
                sum / sentence.words as f64
            } else {
                0.0
            };
            if sentence.position < lead_cutoff {
                score *= LEAD_BOOST;
            }
            (score, sentence)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_sentences.max(1));

    // Selected sentences read better in document order.
    scored.sort_by_key(|(_, s)| s.position);

    let joined = scored
        .iter()
        .map(|(_, s)| s.text.as_str())
        .collect::<Vec<_>>()
        .join(". ");

    format!("{joined}.")
}

fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;

    for (pos, c) in text.chars().enumerate() {
        if matches!(c, '.' | '!' | '?') {
            push_sentence(&mut sentences, &current, start);
            current.clear();
            start = pos + 1;
        } else {
            current.push(c);
        }
    }
    push_sentence(&mut sentences, &current, start);

    sentences
}

fn push_sentence(sentences: &mut Vec<Sentence>, raw: &str, position: usize) {
    let text = raw.trim();
    if text.len() > MIN_SENTENCE_LEN {
        sentences.push(Sentence {
            text: text.to_string(),
            position,
            words: words_of(text).count(),
        });
    }
}

fn word_frequencies(text: &str) -> AHashMap<String, u32> {
    let mut frequencies = AHashMap::new();
    for word in words_of(text) {
        *frequencies.entry(word).or_insert(0) += 1;
    }
    frequencies
}

fn words_of(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_frequent_sentences() {
        let text = "Revenue grew strongly this quarter and revenue targets were met. \
                    The office plants were watered on Tuesday. \
                    Revenue growth came from recurring revenue contracts.";
        let summary = extract_summary(text, 2);

        assert!(summary.to_lowercase().contains("revenue"));
        assert!(!summary.contains("plants"));
    }

    #[test]
    fn test_selected_sentences_keep_document_order() {
        let text = "Alpha metrics dominate the alpha report for alpha teams. \
                    Unrelated filler sentence about nothing in particular. \
                    Alpha numbers confirm the alpha metrics trend clearly.";
        let summary = extract_summary(text, 2);

        let first = summary.find("Alpha metrics dominate").unwrap();
        let second = summary.find("Alpha numbers confirm").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_fragments_are_dropped() {
        let text = "Ok. Yes. The deployment completed successfully after the migration ran.";
        let summary = extract_summary(text, 3);

        assert!(!summary.starts_with("Ok"));
        assert!(summary.contains("deployment completed successfully"));
    }

    #[test]
    fn test_fragment_only_input_degrades_to_raw_text() {
        // Every split piece is a fragment, but input is non-empty.
        let text = "Q4 was up 15% vs Q3.";
        let summary = extract_summary(text, 2);
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_summary("", 3), "");
        assert_eq!(extract_summary("   ", 3), "");
    }

    #[test]
    fn test_deterministic() {
        let text = "One sentence about indexing documents. Another sentence about retrieval quality. \
                    A final sentence about answer synthesis and confidence.";
        assert_eq!(extract_summary(text, 2), extract_summary(text, 2));
    }
}
