// THEORY:
// Picking the best-scoring mask independently on every frame makes the tracked
// outline flicker between levels whenever two scores are close. The selector adds
// hysteresis: the level used on the previous frame stays selected unless a
// challenger beats it by a configurable relative margin.
//
// With margin `m`, a challenger at index `best` replaces `prev` only when
// `score[best] > score[prev] * (1 + m)`. A margin of 0 means "switch on any strict
// improvement"; an infinite margin freezes the selection.

use crate::core_modules::threshold_bank::LEVEL_COUNT;

/// Index of the highest score. Ties resolve to the lowest index, and NaN never wins.
pub fn argmax_level(scores: &[f64; LEVEL_COUNT]) -> usize {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] || scores[best].is_nan() && !score.is_nan() {
            best = index;
        }
    }
    best
}

/// Applies hysteresis to the per-level scores of one frame and returns the level
/// index to use. An out-of-range `prev` is treated as "no previous choice".
pub fn select_threshold(prev: usize, scores: &[f64; LEVEL_COUNT], margin: f64) -> usize {
    let best = argmax_level(scores);
    if prev >= LEVEL_COUNT || best == prev {
        return best;
    }
    if scores[best] > scores[prev] * (1.0 + margin) {
        best
    } else {
        prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax_level(&[1.0, 3.0, 2.0]), 1);
        assert_eq!(argmax_level(&[2.0, 2.0, 2.0]), 0);
        assert_eq!(argmax_level(&[0.0, 5.0, 5.0]), 1);
        assert_eq!(argmax_level(&[f64::NAN, 0.0, 1.0]), 2);
    }

    #[test]
    fn challenger_needs_to_clear_the_margin() {
        // Previous = medium (1), default margin 2.0: needs > 3x.
        assert_eq!(select_threshold(1, &[29.0, 10.0, 0.0], 2.0), 1);
        assert_eq!(select_threshold(1, &[30.0, 10.0, 0.0], 2.0), 1);
        assert_eq!(select_threshold(1, &[30.5, 10.0, 0.0], 2.0), 0);
    }

    #[test]
    fn zero_margin_switches_on_strict_improvement() {
        assert_eq!(select_threshold(0, &[4.0, 4.0, 0.0], 0.0), 0);
        assert_eq!(select_threshold(0, &[4.0, 4.1, 0.0], 0.0), 1);
    }

    #[test]
    fn infinite_margin_freezes_selection() {
        assert_eq!(select_threshold(2, &[1e9, 1e9, 1.0], f64::INFINITY), 2);
    }

    #[test]
    fn zero_previous_score_yields_to_any_positive_challenger() {
        assert_eq!(select_threshold(1, &[0.0, 0.0, 0.5], 2.0), 2);
        assert_eq!(select_threshold(1, &[0.0, 0.0, 0.0], 2.0), 1);
    }

    #[test]
    fn out_of_range_previous_takes_the_argmax() {
        assert_eq!(select_threshold(7, &[1.0, 2.0, 3.0], 2.0), 2);
    }

    #[test]
    fn result_is_always_a_valid_level() {
        let grids = [[0.0; 3], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [f64::NAN; 3]];
        for prev in 0..5 {
            for scores in &grids {
                assert!(select_threshold(prev, scores, 2.0) < LEVEL_COUNT);
            }
        }
    }
}
