use codematch_common::CodematchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Representative `(distance, index)` of one label group, given its
/// distances and original ranks in retrieval order
pub type ScoreFn = fn(&[f32], &[usize]) -> (f32, usize);

/// Position of the smallest distance, first one on ties
fn best_position(distances: &[f32]) -> usize {
    distances
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &d)| match best {
            Some((_, b)) if b <= d => best,
            _ => Some((i, d)),
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Best (minimum) distance of the group and its position
pub fn naive_scorer(distances: &[f32], _ranks: &[usize]) -> (f32, usize) {
    let index = best_position(distances);
    (distances.get(index).copied().unwrap_or(f32::INFINITY), index)
}

/// Mean distance of the group.
///
/// The index still points at the minimum-distance entry, so the shown
/// description is the best single match while the score reflects the group.
pub fn average_scorer(distances: &[f32], _ranks: &[usize]) -> (f32, usize) {
    if distances.is_empty() {
        return (f32::INFINITY, 0);
    }
    let mean = distances.iter().sum::<f32>() / distances.len() as f32;
    (mean, best_position(distances))
}

/// Label group scoring policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Naive,
    Average,
}

impl ScoringMethod {
    pub fn scorer(&self) -> ScoreFn {
        match self {
            Self::Naive => naive_scorer,
            Self::Average => average_scorer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScoringMethod {
    type Err = CodematchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "average" => Ok(Self::Average),
            other => Err(CodematchError::configuration(format!(
                "Unknown scoring method '{}', expected naive or average",
                other
            ))),
        }
    }
}

/// `exp(-d_i) / Σ exp(-d_j)` rounded to 3 decimals, rendered as strings
pub fn softmax_scores(distances: &[f32]) -> Vec<String> {
    let weights: Vec<f64> = distances.iter().map(|&d| (-f64::from(d)).exp()).collect();
    let total: f64 = weights.iter().sum();

    weights
        .into_iter()
        .map(|w| {
            let score = ((w / total) * 1000.0).round() / 1000.0;
            format!("{:?}", score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_picks_first_minimum() {
        assert_eq!(naive_scorer(&[0.3, 0.1, 0.1], &[1, 2, 3]), (0.1, 1));
        assert_eq!(naive_scorer(&[0.2], &[4]), (0.2, 0));
    }

    #[test]
    fn test_average_keeps_best_description() {
        let (distance, index) = average_scorer(&[0.4, 0.2, 0.6], &[1, 2, 3]);
        assert!((distance - 0.4).abs() < 1e-6);
        assert_eq!(index, 1);
    }

    #[test]
    fn test_scoring_method_parse() {
        assert_eq!("naive".parse::<ScoringMethod>().unwrap(), ScoringMethod::Naive);
        assert_eq!(" Average ".parse::<ScoringMethod>().unwrap(), ScoringMethod::Average);
        assert_eq!(
            "median".parse::<ScoringMethod>().unwrap_err().code(),
            "configuration_error"
        );
        assert_eq!(
            serde_json::to_string(&ScoringMethod::Average).unwrap(),
            "\"average\""
        );
        assert_eq!(ScoringMethod::default(), ScoringMethod::Naive);
    }

    #[test]
    fn test_softmax_scores() {
        assert_eq!(softmax_scores(&[0.11, 0.23]), vec!["0.53", "0.47"]);
        assert_eq!(softmax_scores(&[0.5]), vec!["1.0"]);

        let scores = softmax_scores(&[0.1, 0.4, 0.9, 1.3]);
        let total: f64 = scores.iter().map(|s| s.parse::<f64>().unwrap()).sum();
        assert!((total - 1.0).abs() <= 0.002);
    }
}
