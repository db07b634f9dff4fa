use crate::linalg::{column_sum_squares, pseudo_inverse};
use crate::reduce::{BlockStats, ScoreStats};
use ndarray::{Array1, ArrayView1, Axis};
use ndarray_linalg::error::LinalgError;

/// Outcome of the first scoring pass.
#[derive(Debug, Clone)]
pub struct InitialSelection {
    pub feature: usize,
    pub score: f64,
    pub scores: Array1<f64>,
}

/// Conditional scores for the unselected columns of one round.
#[derive(Debug, Clone)]
pub struct ConditionalScores {
    /// One score per unselected column, in the order of the round's split.
    pub scores: Array1<f64>,
    /// Effective rank of the selected block's Gram matrix.
    pub rank: usize,
}

/// Position of the largest score. NaN never wins and ties go to the lowest position.
pub fn argmax(scores: ArrayView1<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &value) in scores.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// `s_j = (E[0,j]^2 + E[1,j]^2) / V[j]`.
///
/// An all-zero feature scores `0/0 = NaN` and is therefore never selected.
pub fn initial_scores(stats: &ScoreStats) -> Array1<f64> {
    column_sum_squares(stats.e.view()) / &stats.v
}

/// Scores every feature and picks the best one, or `None` if no score is a number.
pub fn select_initial(stats: &ScoreStats) -> Option<InitialSelection> {
    let scores = initial_scores(stats);
    let feature = argmax(scores.view())?;
    Some(InitialSelection {
        feature,
        score: scores[feature],
        scores,
    })
}

/// Scores each unselected column by the response correlation it adds beyond the
/// selected block, relative to its own residual variance.
///
/// With `B = pinv(A) C12`, `G = CY2 - CY1 B`, `g = colSumSquares(G)` and
/// `w = V2 - colSum(C12 ⊙ B)`, the score is `g / w` column by column.
pub fn conditional_scores(block: &BlockStats) -> Result<ConditionalScores, LinalgError> {
    let pinv = pseudo_inverse(&block.a)?;
    let b = pinv.matrix.dot(&block.c12);
    let residual = &block.cy2 - &block.cy1.dot(&b);
    let residual_energy = column_sum_squares(residual.view());
    let explained = (&block.c12 * &b).sum_axis(Axis(0));
    let residual_variance = &block.v2 - &explained;

    Ok(ConditionalScores {
        scores: residual_energy / residual_variance,
        rank: pinv.rank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SelectedSet;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn argmax_prefers_first_maximum_and_skips_nan() {
        assert_eq!(argmax(array![1.0, 3.0, 3.0, 2.0].view()), Some(1));
        assert_eq!(argmax(array![f64::NAN, 0.5, f64::NAN].view()), Some(1));
        assert_eq!(argmax(array![f64::NEG_INFINITY, -1.0].view()), Some(1));
        assert_eq!(argmax(array![f64::NAN, f64::NAN].view()), None);
        assert_eq!(argmax(Array1::<f64>::zeros(0).view()), None);
    }

    #[test]
    fn initial_scores_follow_closed_form() {
        let stats = ScoreStats {
            e: array![[3.0, 1.0, 0.0], [4.0, 1.0, 0.0]],
            v: array![5.0, 1.0, 0.0],
        };
        let scores = initial_scores(&stats);
        assert_eq!(scores[0], 5.0);
        assert_eq!(scores[1], 2.0);
        assert!(scores[2].is_nan());

        let chosen = select_initial(&stats).unwrap();
        assert_eq!(chosen.feature, 0);
        assert_eq!(chosen.score, 5.0);
    }

    #[test]
    fn initial_selection_is_idempotent() {
        let stats = ScoreStats {
            e: array![[1.0, 2.0, 2.0, 0.5], [0.0, 1.0, 1.0, 0.5]],
            v: array![1.0, 1.0, 1.0, 1.0],
        };
        let first = select_initial(&stats).unwrap().feature;
        for _ in 0..5 {
            assert_eq!(select_initial(&stats).unwrap().feature, first);
        }
        assert_eq!(first, 1);
    }

    #[test]
    fn all_zero_features_leave_no_candidate() {
        let stats = ScoreStats {
            e: Array2::zeros((2, 3)),
            v: Array1::zeros(3),
        };
        assert!(select_initial(&stats).is_none());
    }

    /// `||Y^T r||^2 / ||r||^2`, with `r` the least-squares residual of the
    /// candidate column against the selected columns.
    fn residual_score(x: &Array2<f64>, y: &Array2<f64>, selected: &[usize], candidate: usize) -> f64 {
        let x1 = x.select(Axis(1), selected);
        let column = x.column(candidate).to_owned();
        let coefficients = pseudo_inverse(&x1).unwrap().matrix.dot(&column);
        let residual = &column - &x1.dot(&coefficients);
        let correlation = y.t().dot(&residual);
        correlation.dot(&correlation) / residual.dot(&residual)
    }

    #[test]
    fn conditional_scores_match_direct_least_squares() {
        let mut rng = StdRng::seed_from_u64(42);
        let x = Array2::from_shape_fn((40, 6), |_| rng.gen_range(-1.0..1.0));
        let y = Array2::from_shape_fn((40, 2), |(r, c)| {
            let positive = r % 3 == 0;
            match (positive, c) {
                (true, 0) => 0.4,
                (true, _) => -0.2,
                (false, 0) => 0.3,
                (false, _) => -0.25,
            }
        });

        let selected: SelectedSet = [4, 1].into_iter().collect();
        let split = selected.split(6);
        let block = BlockStats::local(x.view(), y.view(), &split);
        let scored = conditional_scores(&block).unwrap();
        assert_eq!(scored.rank, 2);
        assert_eq!(scored.scores.len(), split.unselected.len());

        for (position, &feature) in split.unselected.iter().enumerate() {
            let expected = residual_score(&x, &y, &split.selected, feature);
            assert_relative_eq!(scored.scores[position], expected, max_relative = 1e-8);
        }
    }

    #[test]
    fn collinear_selected_block_is_recovered_silently() {
        let x = array![
            [1.0, 2.0, 0.0, 1.0],
            [2.0, 4.0, 1.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 2.0, 2.0, 3.0],
            [3.0, 6.0, 0.5, 1.0]
        ];
        let y = Array2::from_shape_fn((5, 2), |(r, c)| if (r + c) % 2 == 0 { 0.5 } else { -0.5 });
        let selected: SelectedSet = [0, 1].into_iter().collect();
        let block = BlockStats::local(x.view(), y.view(), &selected.split(4));
        let scored = conditional_scores(&block).unwrap();
        assert_eq!(scored.rank, 1);
        assert!(scored.scores.iter().all(|s| s.is_finite()));

        let expected = residual_score(&x, &y, &[0], 2);
        assert_relative_eq!(scored.scores[0], expected, max_relative = 1e-8);
    }
}
