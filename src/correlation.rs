//! Spearman rank correlation.
use crate::{
    stats::{Outcome, StatResult},
    Result,
};
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt;

/// Conventional wording for the size of a correlation coefficient.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub enum Strength {
    Negligible,
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl Strength {
    pub fn of(coefficient: f64) -> Self {
        let r = coefficient.abs();
        if r < 0.1 {
            Strength::Negligible
        } else if r < 0.3 {
            Strength::Weak
        } else if r < 0.5 {
            Strength::Moderate
        } else if r < 0.7 {
            Strength::Strong
        } else {
            Strength::VeryStrong
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Strength::Negligible => "negligible",
            Strength::Weak => "weak",
            Strength::Moderate => "moderate",
            Strength::Strong => "strong",
            Strength::VeryStrong => "very strong",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
pub enum Direction {
    Positive,
    Negative,
    None,
}

impl Direction {
    pub fn of(coefficient: f64) -> Self {
        if coefficient > 0. {
            Direction::Positive
        } else if coefficient < 0. {
            Direction::Negative
        } else {
            Direction::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub coefficient: f64,
    pub result: StatResult,
    pub strength: Strength,
    pub direction: Direction,
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "rho = {:.3} ({} {:?}), p = {:.4}, n = {}{}",
            self.coefficient,
            self.strength.label(),
            self.direction,
            self.result.p_value,
            self.result.n,
            if self.result.significant { " *" } else { "" }
        )
    }
}

/// Spearman correlation over the pairs where both values are present.
///
/// Tied values get their average rank. The p-value is the two-sided t approximation with
/// n - 2 degrees of freedom.
pub fn spearman(x: &[Option<f64>], y: &[Option<f64>]) -> Result<Outcome<Correlation>> {
    ensure!(
        x.len() == y.len(),
        "correlated sequences differ in length ({} and {})",
        x.len(),
        y.len()
    );
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    let n = xs.len();
    if n < 3 {
        return Ok(Outcome::not_computed(format!(
            "{} complete pair(s), need at least 3",
            n
        )));
    }

    let Some(rho) = pearson(&rank(&xs), &rank(&ys)) else {
        return Ok(Outcome::not_computed("a variable is constant"));
    };
    let rho = rho.clamp(-1., 1.);
    let df = (n - 2) as f64;
    let p_value = if (1. - rho.abs()) <= f64::EPSILON {
        0.
    } else {
        let t = rho * (df / ((1. - rho) * (1. + rho))).sqrt();
        let dist = StudentsT::new(0., 1., df)?;
        (2. * (1. - dist.cdf(t.abs()))).clamp(0., 1.)
    };
    Ok(Outcome::Computed(Correlation {
        coefficient: rho,
        result: StatResult::new("Spearman correlation", rho, p_value, Some(df), None, n),
        strength: Strength::of(rho),
        direction: Direction::of(rho),
    }))
}

/// Like [`spearman`], but only computed when more than `more_than` complete pairs exist.
pub fn spearman_with_minimum(
    x: &[Option<f64>],
    y: &[Option<f64>],
    more_than: usize,
) -> Result<Outcome<Correlation>> {
    let complete = x
        .iter()
        .zip(y)
        .filter(|(x, y)| x.is_some() && y.is_some())
        .count();
    if x.len() == y.len() && complete <= more_than {
        return Ok(Outcome::not_computed(format!(
            "insufficient data: {} complete pairs, need more than {}",
            complete, more_than
        )));
    }
    spearman(x, y)
}

/// 1-based ranks, ties share the mean of the ranks they span.
fn rank(values: &[f64]) -> Vec<f64> {
    let mut order = (0..values.len()).collect::<Vec<_>>();
    order.sort_by_key(|idx| r64(values[*idx]));
    let mut ranks = vec![0.; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start + 1 ..= end
        let shared = (start + end + 1) as f64 / 2.;
        for idx in &order[start..end] {
            ranks[*idx] = shared;
        }
        start = end;
    }
    ranks
}

/// `None` when either variable has no spread.
fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0., 0., 0.);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0. || syy == 0. {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn average_ranks_for_ties() {
        assert_eq!(rank(&[10., 20., 10., 30.]), vec![1.5, 3., 1.5, 4.]);
        assert_eq!(rank(&[3., 3., 3.]), vec![2., 2., 2.]);
    }

    #[test]
    fn monotonic_is_perfect() {
        let x = some(&[1., 2., 3., 4., 5., 6.]);
        let y = some(&[2., 4., 8., 16., 32., 64.]);
        let c = spearman(&x, &y).unwrap();
        let c = c.computed().unwrap();
        assert_abs_diff_eq!(c.coefficient, 1.);
        assert_eq!(c.result.p_value, 0.);
        assert_eq!(c.strength, Strength::VeryStrong);
        assert_eq!(c.direction, Direction::Positive);
    }

    #[test]
    fn tied_groups_against_increasing_values() {
        // ranks [1.5, 1.5, 3.5, 3.5, 5.5, 5.5] against 1..=6
        let x = some(&[1., 1., 2., 2., 3., 3.]);
        let y = some(&[1., 2., 3., 4., 5., 6.]);
        let c = spearman(&x, &y).unwrap();
        let c = c.computed().unwrap();
        assert_abs_diff_eq!(c.coefficient, 16. / 280f64.sqrt(), epsilon = 1e-12);
        assert!(c.result.p_value < 0.01);
        assert_eq!(c.result.n, 6);
    }

    #[test]
    fn negative_and_missing_pairs() {
        let x = vec![Some(1.), Some(2.), None, Some(3.), Some(4.)];
        let y = vec![Some(9.), Some(7.), Some(1.), None, Some(2.)];
        let c = spearman(&x, &y).unwrap();
        let c = c.computed().unwrap();
        assert_eq!(c.result.n, 3);
        assert_abs_diff_eq!(c.coefficient, -1.);
        assert_eq!(c.direction, Direction::Negative);
    }

    #[test]
    fn not_computed_cases() {
        assert!(!spearman(&some(&[1., 2.]), &some(&[1., 2.]))
            .unwrap()
            .is_computed());
        assert!(!spearman(&some(&[1., 1., 1.]), &some(&[1., 2., 3.]))
            .unwrap()
            .is_computed());
        assert!(spearman(&some(&[1., 2., 3.]), &some(&[1., 2.])).is_err());
        let x = some(&[1., 2., 3., 4., 5.]);
        assert!(!spearman_with_minimum(&x, &x, 10).unwrap().is_computed());
        assert!(spearman_with_minimum(&x, &x, 4).unwrap().is_computed());
    }

    #[test]
    fn strength_bands() {
        assert_eq!(Strength::of(0.05), Strength::Negligible);
        assert_eq!(Strength::of(-0.2), Strength::Weak);
        assert_eq!(Strength::of(0.3), Strength::Moderate);
        assert_eq!(Strength::of(0.69), Strength::Strong);
        assert_eq!(Strength::of(-0.7), Strength::VeryStrong);
    }
}
