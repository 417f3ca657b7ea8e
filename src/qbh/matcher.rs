//! Sliding-window melodic similarity
//!
//! Scores a hummed query against a catalog pitch sequence. When the
//! candidate is longer than the query, a window of the query's length
//! slides across it and the best-aligned window wins.

use super::histogram::{cosine_similarity, ToneHistograms};

/// Histogram weights: interval shape dominates, absolute pitch barely
/// matters (a hummed query is rarely in the original key).
const ATB_WEIGHT: f64 = 0.05;
const RTB_WEIGHT: f64 = 0.55;
const FTB_WEIGHT: f64 = 0.40;

/// Weighted histogram score between a query and one candidate window.
fn histogram_score(query: &ToneHistograms, window: &ToneHistograms) -> f64 {
    ATB_WEIGHT * cosine_similarity(&query.atb, &window.atb)
        + RTB_WEIGHT * cosine_similarity(&query.rtb, &window.rtb)
        + FTB_WEIGHT * cosine_similarity(&query.ftb, &window.ftb)
}

/// Similarity between a query pitch sequence and a candidate sequence,
/// in [0, 1]. Empty sequences score 0.
///
/// Candidates no longer than the query are scored whole. Longer
/// candidates are scanned with a sliding window of the query's length:
/// ATB and RTB are updated incrementally per step, FTB is rebuilt since
/// its anchor note changes with the window. Returns the maximum window
/// score.
pub fn melody_similarity(query: &[u8], candidate: &[u8]) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let query_histograms = ToneHistograms::from_pitches(query);

    let window = query.len();
    if candidate.len() <= window {
        return histogram_score(&query_histograms, &ToneHistograms::from_pitches(candidate));
    }

    let mut histograms = ToneHistograms::from_pitches(&candidate[..window]);
    let mut best = histogram_score(&query_histograms, &histograms);

    for i in window..candidate.len() {
        histograms.atb_shift(candidate[i - window], candidate[i]);
        histograms.rtb_shift(
            (candidate[i - window], candidate[i - window + 1]),
            (candidate[i - 1], candidate[i]),
        );
        histograms.ftb_rebuild(&candidate[i + 1 - window..=i]);

        let score = histogram_score(&query_histograms, &histograms);
        if score > best {
            best = score;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_sequences_score_one() {
        let pitches: Vec<u8> = vec![60, 62, 64];
        let score = melody_similarity(&pitches, &pitches);
        assert!(
            (score - 1.0).abs() < 1e-12,
            "identical sequences must score exactly 1, got {}",
            score
        );
    }

    #[test]
    fn test_sliding_window_finds_alignment() {
        let query: Vec<u8> = vec![60, 62, 64];
        let candidate: Vec<u8> = vec![72, 60, 62, 64, 76];
        let score = melody_similarity(&query, &candidate);
        assert!(
            score >= 0.99,
            "embedded exact match should score >= 0.99, got {}",
            score
        );
    }

    #[test]
    fn test_empty_candidate_scores_zero() {
        assert_eq!(melody_similarity(&[60], &[]), 0.0);
        assert_eq!(melody_similarity(&[], &[60]), 0.0);
        assert_eq!(melody_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_prefix_padding_never_lowers_score() {
        let query: Vec<u8> = vec![55, 57, 59, 60];
        let melody: Vec<u8> = vec![55, 57, 59, 60, 62];
        let mut padded: Vec<u8> = vec![100, 30, 90];
        padded.extend_from_slice(&melody);

        let plain = melody_similarity(&query, &melody);
        let shifted = melody_similarity(&query, &padded);
        assert!(
            shifted >= plain - 1e-12,
            "prepended noise must not hide the best alignment: {} < {}",
            shifted,
            plain
        );
    }

    #[test]
    fn test_shorter_candidate_scored_whole() {
        let query: Vec<u8> = vec![60, 62, 64, 65];
        let candidate: Vec<u8> = vec![60, 62];
        let score = melody_similarity(&query, &candidate);
        assert!(score > 0.0);
        assert!(score < 1.0);
    }

    #[test]
    fn test_scores_bounded() {
        let query: Vec<u8> = vec![60, 64, 67];
        let candidates: Vec<Vec<u8>> = vec![
            vec![0, 127, 0, 127],
            vec![60; 40],
            vec![60, 64, 67, 60, 64, 67],
            (40..90).collect(),
        ];
        for candidate in &candidates {
            let score = melody_similarity(&query, candidate);
            assert!(score.is_finite());
            assert!((0.0..=1.0 + 1e-12).contains(&score), "score {}", score);
        }
    }

    #[test]
    fn test_window_scan_matches_brute_force() {
        let query: Vec<u8> = vec![61, 63, 66, 61];
        let candidate: Vec<u8> = vec![50, 61, 63, 66, 61, 80, 45, 61, 63];

        let expected = candidate
            .windows(query.len())
            .map(|w| melody_similarity(&query, w))
            .fold(f64::MIN, f64::max);

        let actual = melody_similarity(&query, &candidate);
        assert!(
            (actual - expected).abs() < 1e-12,
            "incremental scan {} != brute force {}",
            actual,
            expected
        );
    }
}
