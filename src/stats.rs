//! Group comparisons: descriptive statistics, one-way ANOVA with Welch post-hoc tests, and
//! chi-square tests.
//!
//! A test that cannot be run on the data it was given is reported as
//! [`Outcome::NotComputed`], never as a non-significant result.
use crate::Result;
use itertools::Itertools;
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use term_data_table as tdt;

/// Significance level used for every test.
pub const ALPHA: f64 = 0.05;

/// Expected cell counts below this violate the chi-square approximation.
pub const MIN_EXPECTED_COUNT: f64 = 5.;

/// `count` as a percentage of `total`, 0 for an empty total.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.
    } else {
        count as f64 / total as f64 * 100.
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Computed(T),
    NotComputed { reason: String },
}

impl<T> Outcome<T> {
    pub fn not_computed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        event!(Level::INFO, "test skipped: {}", reason);
        Outcome::NotComputed { reason }
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            Outcome::Computed(v) => Some(v),
            Outcome::NotComputed { .. } => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Outcome::Computed(_))
    }
}

impl<T: fmt::Display> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Computed(v) => v.fmt(f),
            Outcome::NotComputed { reason } => write!(f, "not computed ({})", reason),
        }
    }
}

/// The result of a single hypothesis test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatResult {
    pub test: &'static str,
    pub statistic: f64,
    pub p_value: f64,
    /// Degrees of freedom, or numerator degrees of freedom for F tests.
    pub df: Option<f64>,
    /// Denominator degrees of freedom for F tests.
    pub df2: Option<f64>,
    pub n: usize,
    pub significant: bool,
}

impl StatResult {
    pub(crate) fn new(
        test: &'static str,
        statistic: f64,
        p_value: f64,
        df: Option<f64>,
        df2: Option<f64>,
        n: usize,
    ) -> Self {
        StatResult {
            test,
            statistic,
            p_value,
            df,
            df2,
            n,
            significant: p_value < ALPHA,
        }
    }

    /// Re-judge significance against `alpha` instead of [`ALPHA`].
    pub fn at_alpha(self, alpha: f64) -> Self {
        StatResult {
            significant: self.p_value < alpha,
            ..self
        }
    }
}

impl fmt::Display for StatResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: statistic = {:.4}", self.test, self.statistic)?;
        match (self.df, self.df2) {
            (Some(df), Some(df2)) => write!(f, ", df = ({}, {})", df, df2)?,
            (Some(df), None) => write!(f, ", df = {:.2}", df)?,
            _ => (),
        }
        write!(f, ", p = {:.4}, n = {}", self.p_value, self.n)?;
        if self.significant {
            f.write_str(" *")?;
        }
        Ok(())
    }
}

/// Summary statistics of a sample. `std` is the sample standard deviation (n - 1), which is
/// NaN for a single observation.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Descriptive {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Descriptive {
    /// `None` for an empty sample.
    pub fn of(values: &[f64]) -> Option<Self> {
        let mut sorted = values.iter().map(|v| r64(*v)).collect::<Vec<_>>();
        sorted.sort_unstable();
        let n = sorted.len();
        let (min, max) = (sorted.first()?.raw(), sorted.last()?.raw());
        let median = if n % 2 == 1 {
            sorted[n / 2].raw()
        } else {
            (sorted[n / 2 - 1].raw() + sorted[n / 2].raw()) / 2.
        };
        Some(Descriptive {
            n,
            mean: mean(values),
            median,
            std: variance(values).sqrt(),
            min,
            max,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Probability of a value at least as large as `x`.
fn upper_tail(dist: &impl ContinuousCDF<f64, f64>, x: f64) -> f64 {
    (1. - dist.cdf(x)).clamp(0., 1.)
}

/// One-way analysis of variance across the given (non-empty) samples.
pub fn one_way_anova(groups: &[&[f64]]) -> Outcome<StatResult> {
    let k = groups.len();
    if k < 2 {
        return Outcome::not_computed(format!("{} group(s) with observations, need 2", k));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Outcome::not_computed("a group has no observations");
    }
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if n <= k {
        return Outcome::not_computed("no within-group degrees of freedom");
    }

    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let mut ss_between = 0.;
    let mut ss_within = 0.;
    for group in groups {
        let m = mean(group);
        ss_between += group.len() as f64 * (m - grand_mean).powi(2);
        ss_within += group.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    }
    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;

    let (f, p) = if ms_within == 0. {
        if ms_between == 0. {
            return Outcome::not_computed("all observations are identical");
        }
        (f64::INFINITY, 0.)
    } else {
        let f = ms_between / ms_within;
        match FisherSnedecor::new(df_between, df_within) {
            Ok(dist) => (f, upper_tail(&dist, f)),
            Err(e) => return Outcome::not_computed(format!("F distribution: {}", e)),
        }
    };
    Outcome::Computed(StatResult::new(
        "One-way ANOVA",
        f,
        p,
        Some(df_between),
        Some(df_within),
        n,
    ))
}

/// Two-sample t-test without assuming equal variances (Welch), two-sided.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Outcome<StatResult> {
    if a.len() < 2 || b.len() < 2 {
        return Outcome::not_computed(format!(
            "Welch t-test needs 2 observations per group, got {} and {}",
            a.len(),
            b.len()
        ));
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (variance(a) / na, variance(b) / nb);
    let se2 = va + vb;
    if se2 == 0. {
        return Outcome::not_computed("both groups have zero variance");
    }
    let t = (mean(a) - mean(b)) / se2.sqrt();
    let df = se2.powi(2) / (va.powi(2) / (na - 1.) + vb.powi(2) / (nb - 1.));
    let p = match StudentsT::new(0., 1., df) {
        Ok(dist) => (2. * upper_tail(&dist, t.abs())).min(1.),
        Err(e) => return Outcome::not_computed(format!("t distribution: {}", e)),
    };
    Outcome::Computed(StatResult::new(
        "Welch t-test",
        t,
        p,
        Some(df),
        None,
        a.len() + b.len(),
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary<G> {
    pub group: G,
    pub summary: Descriptive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseTest {
    pub result: StatResult,
    /// Raw p-value times the number of pairwise tests run. Not capped at 1.
    pub p_bonferroni: f64,
    pub significant_bonferroni: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseResult<G> {
    pub group_a: G,
    pub group_b: G,
    pub mean_a: f64,
    pub mean_b: f64,
    pub mean_difference: f64,
    pub test: Outcome<PairwiseTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuousComparison<G> {
    /// Only groups with at least one observation.
    pub groups: Vec<GroupSummary<G>>,
    pub omnibus: Outcome<StatResult>,
    /// Present only when the omnibus test was significant.
    pub post_hoc: Option<Vec<PairwiseResult<G>>>,
}

/// Compare a continuous variable across groups.
///
/// Empty groups are left out. Pairwise Welch tests follow only a significant ANOVA, and their
/// Bonferroni factor is the number of pairwise tests that could actually be run.
pub fn compare_continuous_across_groups<G>(
    values_by_group: &BTreeMap<G, Vec<f64>>,
    alpha: f64,
) -> ContinuousComparison<G>
where
    G: Ord + Copy,
{
    let present = values_by_group
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(group, values)| (*group, values.as_slice()))
        .collect::<Vec<_>>();
    let groups = present
        .iter()
        .filter_map(|(group, values)| {
            Some(GroupSummary {
                group: *group,
                summary: Descriptive::of(values)?,
            })
        })
        .collect();

    let omnibus = if present.len() < 2 {
        Outcome::not_computed(format!(
            "{} group(s) with observations, need 2",
            present.len()
        ))
    } else {
        match one_way_anova(&present.iter().map(|(_, v)| *v).collect::<Vec<_>>()) {
            Outcome::Computed(result) => Outcome::Computed(result.at_alpha(alpha)),
            not_computed => not_computed,
        }
    };

    let post_hoc = match &omnibus {
        Outcome::Computed(result) if result.p_value < alpha => Some(pairwise(&present, alpha)),
        _ => None,
    };

    ContinuousComparison {
        groups,
        omnibus,
        post_hoc,
    }
}

fn pairwise<G: Copy>(present: &[(G, &[f64])], alpha: f64) -> Vec<PairwiseResult<G>> {
    let raw = present
        .iter()
        .tuple_combinations()
        .map(|((ga, a), (gb, b))| (*ga, *gb, mean(a), mean(b), welch_t_test(a, b)))
        .collect::<Vec<_>>();
    let tests_run = raw.iter().filter(|(.., test)| test.is_computed()).count();

    raw.into_iter()
        .map(|(group_a, group_b, mean_a, mean_b, test)| {
            let test = match test {
                Outcome::Computed(result) => {
                    let p_bonferroni = result.p_value * tests_run as f64;
                    Outcome::Computed(PairwiseTest {
                        significant_bonferroni: result.p_value < alpha / tests_run as f64,
                        p_bonferroni,
                        result: result.at_alpha(alpha),
                    })
                }
                Outcome::NotComputed { reason } => Outcome::NotComputed { reason },
            };
            PairwiseResult {
                group_a,
                group_b,
                mean_a,
                mean_b,
                mean_difference: mean_a - mean_b,
                test,
            }
        })
        .collect()
}

impl<G: fmt::Display> ContinuousComparison<G> {
    pub fn term_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Group"))
                .with_cell(Cell::from("n"))
                .with_cell(Cell::from("Mean"))
                .with_cell(Cell::from("Median"))
                .with_cell(Cell::from("SD"))
                .with_cell(Cell::from("Min"))
                .with_cell(Cell::from("Max")),
        );
        for GroupSummary { group, summary: s } in &self.groups {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(group.to_string()))
                    .with_cell(Cell::from(s.n.to_string()))
                    .with_cell(Cell::from(format!("{:.2}", s.mean)))
                    .with_cell(Cell::from(format!("{:.2}", s.median)))
                    .with_cell(Cell::from(format!("{:.2}", s.std)))
                    .with_cell(Cell::from(format!("{:.2}", s.min)))
                    .with_cell(Cell::from(format!("{:.2}", s.max))),
            );
        }
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Omnibus"))
                .with_cell(Cell::from(self.omnibus.to_string())),
        );
        for pair in self.post_hoc.iter().flatten() {
            let text = match &pair.test {
                Outcome::Computed(t) => format!(
                    "t = {:.3}, p = {:.4}, p (Bonferroni) = {:.4}{}",
                    t.result.statistic,
                    t.result.p_value,
                    t.p_bonferroni,
                    if t.significant_bonferroni { " *" } else { "" }
                ),
                Outcome::NotComputed { reason } => format!("not computed ({})", reason),
            };
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(format!("{} vs {}", pair.group_a, pair.group_b)))
                    .with_cell(Cell::from(format!("diff = {:.2}", pair.mean_difference)))
                    .with_cell(Cell::from(text)),
            );
        }
        table
    }
}

/// Counts of observations by group and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContingencyTable<G: Ord, C: Ord> {
    counts: BTreeMap<G, BTreeMap<C, usize>>,
}

impl<G: Ord + Copy, C: Ord + Copy> ContingencyTable<G, C> {
    pub fn new() -> Self {
        ContingencyTable {
            counts: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, group: G, category: C) {
        *self
            .counts
            .entry(group)
            .or_insert_with(BTreeMap::new)
            .entry(category)
            .or_insert(0) += 1;
    }

    pub fn get(&self, group: G, category: C) -> usize {
        self.counts
            .get(&group)
            .and_then(|row| row.get(&category))
            .copied()
            .unwrap_or(0)
    }

    pub fn groups(&self) -> impl Iterator<Item = G> + '_ {
        self.counts.keys().copied()
    }

    pub fn categories(&self) -> BTreeSet<C> {
        self.counts
            .values()
            .flat_map(|row| row.keys().copied())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.counts.values().flat_map(|row| row.values()).sum()
    }
}

impl<G: Ord + Copy, C: Ord + Copy> Default for ContingencyTable<G, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Ord + Copy, C: Ord + Copy> FromIterator<(G, C)> for ContingencyTable<G, C> {
    fn from_iter<T: IntoIterator<Item = (G, C)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (group, category) in iter {
            table.add(group, category);
        }
        table
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareTest {
    pub result: StatResult,
    pub min_expected: f64,
    pub cells_below_five: usize,
    pub total_cells: usize,
    /// Some expected count is below 5. The result is still reported.
    pub assumption_violated: bool,
    /// Yates' correction was applied (tables with one degree of freedom).
    pub continuity_corrected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalComparison<G: Ord, C: Ord> {
    pub table: ContingencyTable<G, C>,
    pub test: Outcome<ChiSquareTest>,
}

/// Chi-square test of independence between group and category.
///
/// Groups and categories without any observation are dropped first; at least a 2x2 table must
/// remain.
pub fn compare_categorical_across_groups<G, C>(
    contingency: &ContingencyTable<G, C>,
) -> CategoricalComparison<G, C>
where
    G: Ord + Copy,
    C: Ord + Copy,
{
    let categories = contingency
        .categories()
        .into_iter()
        .filter(|c| contingency.groups().any(|g| contingency.get(g, *c) > 0))
        .collect::<Vec<_>>();
    let observed = contingency
        .groups()
        .map(|g| {
            categories
                .iter()
                .map(|c| contingency.get(g, *c) as f64)
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(|v| *v > 0.))
        .collect::<Vec<_>>();

    CategoricalComparison {
        table: contingency.clone(),
        test: chi_square_independence(&observed),
    }
}

fn chi_square_independence(observed: &[Vec<f64>]) -> Outcome<ChiSquareTest> {
    let rows = observed.len();
    let cols = observed.first().map(|r| r.len()).unwrap_or(0);
    if rows < 2 || cols < 2 {
        return Outcome::not_computed(format!(
            "contingency table is {}x{} after dropping empty rows and columns, need at least 2x2",
            rows, cols
        ));
    }
    let row_totals = observed.iter().map(|r| r.iter().sum::<f64>()).collect::<Vec<_>>();
    let col_totals = (0..cols)
        .map(|j| observed.iter().map(|r| r[j]).sum::<f64>())
        .collect::<Vec<_>>();
    let total: f64 = row_totals.iter().sum();
    let df = (rows - 1) * (cols - 1);
    let continuity_corrected = df == 1;

    let mut statistic = 0.;
    let mut min_expected = f64::INFINITY;
    let mut cells_below_five = 0;
    for (i, row) in observed.iter().enumerate() {
        for (j, obs) in row.iter().enumerate() {
            let expected = row_totals[i] * col_totals[j] / total;
            min_expected = min_expected.min(expected);
            if expected < MIN_EXPECTED_COUNT {
                cells_below_five += 1;
            }
            let mut obs = *obs;
            if continuity_corrected {
                let diff = expected - obs;
                obs += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (obs - expected).powi(2) / expected;
        }
    }
    let p = match ChiSquared::new(df as f64) {
        Ok(dist) => upper_tail(&dist, statistic),
        Err(e) => return Outcome::not_computed(format!("chi-square distribution: {}", e)),
    };
    let result = StatResult::new(
        "Chi-square test of independence",
        statistic,
        p,
        Some(df as f64),
        None,
        total as usize,
    );
    let total_cells = rows * cols;
    if cells_below_five > 0 {
        event!(
            Level::WARN,
            "{} of {} cells have an expected count below {}",
            cells_below_five,
            total_cells,
            MIN_EXPECTED_COUNT
        );
    }
    Outcome::Computed(ChiSquareTest {
        result,
        min_expected,
        cells_below_five,
        total_cells,
        assumption_violated: cells_below_five > 0,
        continuity_corrected,
    })
}

impl<G: Ord + Copy + fmt::Display, C: Ord + Copy + fmt::Display> CategoricalComparison<G, C> {
    pub fn term_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let categories = self.table.categories();
        let mut head = Row::new().with_cell(Cell::from("Group"));
        for category in &categories {
            head = head.with_cell(Cell::from(category.to_string()));
        }
        let mut table = Table::new().with_row(head);
        for group in self.table.groups() {
            let row_total: usize = categories.iter().map(|c| self.table.get(group, *c)).sum();
            let mut row = Row::new().with_cell(Cell::from(group.to_string()));
            for category in &categories {
                let count = self.table.get(group, *category);
                row = row.with_cell(Cell::from(format!(
                    "{} ({:.1}%)",
                    count,
                    percentage(count, row_total)
                )));
            }
            table.add_row(row);
        }
        let summary = match &self.test {
            Outcome::Computed(t) => format!(
                "{}; min expected = {:.2}, cells < 5: {}/{}{}",
                t.result,
                t.min_expected,
                t.cells_below_five,
                t.total_cells,
                if t.assumption_violated {
                    " (assumption violated)"
                } else {
                    ""
                }
            ),
            Outcome::NotComputed { reason } => format!("not computed ({})", reason),
        };
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Test"))
                .with_cell(Cell::from(summary)),
        );
        table
    }
}

/// Chi-square goodness-of-fit of observed counts against expected proportions.
pub fn chi_square_goodness_of_fit(
    observed: &[usize],
    expected_proportions: &[f64],
) -> Result<Outcome<StatResult>> {
    ensure!(
        observed.len() == expected_proportions.len(),
        "{} observed counts but {} expected proportions",
        observed.len(),
        expected_proportions.len()
    );
    let proportion_total: f64 = expected_proportions.iter().sum();
    ensure!(
        (proportion_total - 1.).abs() < 1e-9 && expected_proportions.iter().all(|p| *p > 0.),
        "expected proportions must be positive and sum to 1"
    );
    if observed.len() < 2 {
        return Ok(Outcome::not_computed("need at least 2 categories"));
    }
    let n: usize = observed.iter().sum();
    if n == 0 {
        return Ok(Outcome::not_computed("no observations"));
    }
    let statistic = observed
        .iter()
        .zip(expected_proportions)
        .map(|(obs, p)| {
            let expected = p * n as f64;
            (*obs as f64 - expected).powi(2) / expected
        })
        .sum::<f64>();
    let df = (observed.len() - 1) as f64;
    Ok(match ChiSquared::new(df) {
        Ok(dist) => Outcome::Computed(StatResult::new(
            "Chi-square goodness-of-fit",
            statistic,
            upper_tail(&dist, statistic),
            Some(df),
            None,
            n,
        )),
        Err(e) => Outcome::not_computed(format!("chi-square distribution: {}", e)),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn descriptive_stats() {
        let d = Descriptive::of(&[4., 1., 3., 2.]).unwrap();
        assert_eq!(d.n, 4);
        assert_abs_diff_eq!(d.mean, 2.5);
        assert_abs_diff_eq!(d.median, 2.5);
        assert_abs_diff_eq!(d.std, (5f64 / 3.).sqrt(), epsilon = 1e-12);
        assert_eq!((d.min, d.max), (1., 4.));

        let single = Descriptive::of(&[7.]).unwrap();
        assert!(single.std.is_nan());
        assert_eq!(single.median, 7.);
        assert!(Descriptive::of(&[]).is_none());
    }

    #[test]
    fn anova_reference_values() {
        // ss_between = 24, ss_within = 6, F = (24 / 2) / (6 / 6) = 12
        let a = [1., 2., 3.];
        let b = [3., 4., 5.];
        let c = [5., 6., 7.];
        let result = one_way_anova(&[&a, &b, &c]);
        let result = result.computed().unwrap();
        assert_abs_diff_eq!(result.statistic, 12., epsilon = 1e-12);
        assert_eq!(result.df, Some(2.));
        assert_eq!(result.df2, Some(6.));
        // P(F(2, 6) > 12) = (1 + 2 * 12 / 6) ^ -3 = 1 / 125
        assert_abs_diff_eq!(result.p_value, 0.008, epsilon = 1e-6);
        assert!(result.significant);
    }

    #[test]
    fn caller_alpha_decides_significance() {
        // p = 0.008 as above
        let mut by_group = BTreeMap::new();
        by_group.insert(1, vec![1., 2., 3.]);
        by_group.insert(2, vec![3., 4., 5.]);
        by_group.insert(3, vec![5., 6., 7.]);
        let strict = compare_continuous_across_groups(&by_group, 0.005);
        assert!(!strict.omnibus.computed().unwrap().significant);
        assert!(strict.post_hoc.is_none());

        let loose = compare_continuous_across_groups(&by_group, 0.2);
        assert!(loose.omnibus.computed().unwrap().significant);
        for pair in loose.post_hoc.unwrap() {
            let test = pair.test.computed().unwrap();
            assert_eq!(test.result.significant, test.result.p_value < 0.2);
        }
    }

    #[test]
    fn anova_skipped_with_one_group() {
        let mut by_group = BTreeMap::new();
        by_group.insert(1, vec![]);
        by_group.insert(2, vec![5., 6.]);
        by_group.insert(3, vec![]);
        let cmp = compare_continuous_across_groups(&by_group, ALPHA);
        assert!(!cmp.omnibus.is_computed());
        assert!(cmp.post_hoc.is_none());
        assert_eq!(cmp.groups.len(), 1);
        assert_eq!(cmp.groups[0].group, 2);
        assert!(cmp.term_table().to_string().contains("not computed"));
    }

    #[test]
    fn anova_of_constant_values_is_not_computed() {
        assert!(!one_way_anova(&[&[2., 2.], &[2., 2., 2.]]).is_computed());
    }

    #[test]
    fn welch_reference_values() {
        // means 2 and 5, variances 1 and 2.5 -> se^2 = 1/3 + 1/2
        let a = [1., 2., 3.];
        let b = [3., 4., 5., 6., 7.];
        let result = welch_t_test(&a, &b);
        let result = result.computed().unwrap();
        let se2: f64 = 1. / 3. + 0.5;
        assert_abs_diff_eq!(result.statistic, -3. / se2.sqrt(), epsilon = 1e-12);
        let df = se2.powi(2) / ((1f64 / 3.).powi(2) / 2. + 0.25 / 4.);
        assert_abs_diff_eq!(result.df.unwrap(), df, epsilon = 1e-12);
        assert!(result.p_value > 0.01 && result.p_value < 0.05);
        assert!(!welch_t_test(&[1.], &[1., 2.]).is_computed());
    }

    #[test]
    fn post_hoc_follows_significant_omnibus() {
        let mut by_group = BTreeMap::new();
        by_group.insert("a", vec![1., 2., 3., 2., 1.]);
        by_group.insert("b", vec![1., 2., 2., 3., 2.]);
        by_group.insert("c", vec![9., 10., 11., 10., 9.]);
        let cmp = compare_continuous_across_groups(&by_group, ALPHA);
        assert!(cmp.omnibus.computed().unwrap().significant);
        let pairs = cmp.post_hoc.unwrap();
        assert_eq!(pairs.len(), 3);
        for pair in &pairs {
            let test = pair.test.computed().unwrap();
            assert!(test.p_bonferroni >= test.result.p_value);
            assert_abs_diff_eq!(test.p_bonferroni, test.result.p_value * 3.);
        }
        assert_eq!((pairs[0].group_a, pairs[0].group_b), ("a", "b"));
        assert!(!pairs[0].test.computed().unwrap().significant_bonferroni);
        assert!(pairs[1].test.computed().unwrap().significant_bonferroni);
        assert_abs_diff_eq!(pairs[1].mean_difference, 1.8 - 9.8, epsilon = 1e-12);
    }

    #[test]
    fn single_value_groups_skip_their_pairs() {
        let mut by_group = BTreeMap::new();
        by_group.insert(1, vec![1.]);
        by_group.insert(2, vec![5., 6., 7.]);
        by_group.insert(3, vec![20., 21., 22.]);
        let cmp = compare_continuous_across_groups(&by_group, ALPHA);
        let pairs = cmp.post_hoc.as_ref().unwrap();
        assert!(!pairs[0].test.is_computed());
        assert!(!pairs[1].test.is_computed());
        let test = pairs[2].test.computed().unwrap();
        assert_eq!(test.p_bonferroni, test.result.p_value);
        assert!(cmp.term_table().to_string().contains("not computed"));
    }

    #[test]
    fn no_post_hoc_without_significance() {
        let mut by_group = BTreeMap::new();
        by_group.insert(1, vec![1., 2., 3.]);
        by_group.insert(2, vec![1.5, 2., 2.5]);
        let cmp = compare_continuous_across_groups(&by_group, ALPHA);
        assert!(!cmp.omnibus.computed().unwrap().significant);
        assert!(cmp.post_hoc.is_none());
    }

    #[test]
    fn chi_square_with_continuity_correction() {
        // [[10, 20], [20, 10]], expected 15 everywhere, corrected |O - E| = 4.5
        let mut table = ContingencyTable::new();
        for (g, c, n) in [(1, 'm', 10), (1, 'w', 20), (2, 'm', 20), (2, 'w', 10)] {
            for _ in 0..n {
                table.add(g, c);
            }
        }
        let cmp = compare_categorical_across_groups(&table);
        let test = cmp.test.computed().unwrap();
        assert!(test.continuity_corrected);
        assert_abs_diff_eq!(test.result.statistic, 4. * 4.5 * 4.5 / 15., epsilon = 1e-12);
        assert_eq!(test.result.df, Some(1.));
        assert_eq!(test.result.n, 60);
        assert_abs_diff_eq!(test.min_expected, 15.);
        assert!(!test.assumption_violated);
    }

    #[test]
    fn chi_square_flags_small_expected_counts() {
        let table = [
            (1, 'a'),
            (1, 'a'),
            (1, 'b'),
            (2, 'b'),
            (2, 'c'),
            (3, 'c'),
            (3, 'a'),
        ]
        .into_iter()
        .collect::<ContingencyTable<_, _>>();
        let test = compare_categorical_across_groups(&table).test;
        let test = test.computed().unwrap();
        assert!(!test.continuity_corrected);
        assert_eq!(test.result.df, Some(4.));
        assert_eq!(test.total_cells, 9);
        assert_eq!(test.cells_below_five, 9);
        assert!(test.assumption_violated);
    }

    #[test]
    fn chi_square_needs_two_by_two() {
        let table = [(1, 'm'), (2, 'm'), (2, 'm')]
            .into_iter()
            .collect::<ContingencyTable<_, _>>();
        let cmp = compare_categorical_across_groups(&table);
        assert!(!cmp.test.is_computed());
        assert!(cmp.term_table().to_string().contains("not computed"));
    }

    #[test]
    fn goodness_of_fit() {
        let result = chi_square_goodness_of_fit(&[30, 10], &[0.5, 0.5]).unwrap();
        let result = result.computed().unwrap();
        assert_abs_diff_eq!(result.statistic, 10., epsilon = 1e-12);
        assert_eq!(result.df, Some(1.));
        assert!(result.p_value < 0.01);
        assert!(chi_square_goodness_of_fit(&[1, 2], &[1.]).is_err());
    }

    #[test]
    fn percentages() {
        assert_eq!(percentage(1, 4), 25.);
        assert_eq!(percentage(3, 0), 0.);
    }
}
