//! The fixed set of research questions asked of a visit extract.
//!
//! Each question works on its own denominator and keeps its own [`ExclusionLedger`], so a
//! patient missing an age is only dropped from the analyses that need the age.
use crate::{
    band::{BandCounts, Bands},
    cohort::{aggregate, Aggregation, Cohort, PatientRecord},
    correlation::{spearman, spearman_with_minimum, Correlation},
    healing::HealingGroup,
    ledger::{Entity, ExclusionLedger, IssueKind},
    logistic::{self, Diagnostics, FitOutcome, ModelFrame},
    stats::{
        chi_square_goodness_of_fit, compare_categorical_across_groups,
        compare_continuous_across_groups, percentage, CategoricalComparison, ContingencyTable,
        ContinuousComparison, Descriptive, Outcome, StatResult, ALPHA,
    },
    PatientId, Result, Sex, Status, Visits,
};
use qu::ick_use::*;
use serde::Serialize;
use std::{collections::BTreeMap, ops::RangeInclusive};
use term_data_table as tdt;

/// Ages outside this range are treated as data errors.
pub const VALID_AGE: RangeInclusive<f64> = 0.0..=120.0;
pub const AGE_BAND_CUTS: [f64; 6] = [0., 18., 35., 50., 65., 80.];
/// The sex goodness-of-fit test needs at least this many patients.
pub const MIN_SEX_TEST_PATIENTS: usize = 5;
/// The duration correlation needs more than this many patients.
pub const MIN_DURATION_PATIENTS: usize = 10;
/// Predictor names of the outcome model, in design-matrix order.
pub const MODEL_PREDICTORS: [&str; 7] = [
    "P",
    "FLScore",
    "StatusP",
    "StatusFL",
    "Gender_Male",
    "Alter-Unfall",
    "Risk Factor",
];

/// A result together with the population it was computed on.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis<T> {
    pub included: usize,
    pub exclusions: ExclusionLedger,
    pub result: T,
}

impl<T> Analysis<T> {
    fn new(included: usize, exclusions: ExclusionLedger, result: T) -> Self {
        Analysis {
            included,
            exclusions,
            result,
        }
    }

    fn caption(&self, title: &str) -> String {
        format!(
            "{} (n = {}, excluded = {})",
            title,
            self.included,
            self.exclusions.excluded_count()
        )
    }
}

fn valid_age(record: &PatientRecord, ledger: &mut ExclusionLedger) -> Option<f64> {
    let entity = Entity::Patient(record.patient_id);
    match record.age {
        None => {
            ledger.record(entity, IssueKind::MissingAge, None, "Age value is null/missing");
            None
        }
        Some(age) if !VALID_AGE.contains(&age) => {
            ledger.record(
                entity,
                IssueKind::AgeOutOfRange,
                Some(&age),
                "age outside 0-120",
            );
            None
        }
        Some(age) => Some(age),
    }
}

fn valid_sex(record: &PatientRecord, ledger: &mut ExclusionLedger) -> Option<Sex> {
    if record.sex.is_none() {
        ledger.record(
            Entity::Patient(record.patient_id),
            IssueKind::MissingValue,
            None,
            "sex missing or unrecognised",
        );
    }
    record.sex
}

// Case-level questions

#[derive(Debug, Clone, Serialize)]
pub struct ContactsPerCase {
    pub summary: Option<Descriptive>,
    pub total_contacts: usize,
    /// Number of patients by number of contacts.
    pub distribution: BTreeMap<usize, usize>,
}

/// How many contacts each case needed, over every patient.
pub fn contacts_per_case(cohort: &Cohort) -> Analysis<ContactsPerCase> {
    let counts = cohort.iter().map(|r| r.visit_count).collect::<Vec<_>>();
    let mut distribution = BTreeMap::new();
    for count in &counts {
        *distribution.entry(*count).or_insert(0) += 1;
    }
    let values = counts.iter().map(|c| *c as f64).collect::<Vec<_>>();
    Analysis::new(
        counts.len(),
        ExclusionLedger::new(),
        ContactsPerCase {
            summary: Descriptive::of(&values),
            total_contacts: counts.iter().sum(),
            distribution,
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationPerCase {
    pub single_date: usize,
    pub multiple_dates: usize,
    /// Durations of every patient with a valid date, single-date patients as 0.
    pub summary: Option<Descriptive>,
    /// Durations of patients with more than one valid date.
    pub summary_multiple: Option<Descriptive>,
}

/// Days from first to last contact, over patients with at least one valid date.
pub fn duration_per_case(cohort: &Cohort) -> Analysis<DurationPerCase> {
    let mut ledger = ExclusionLedger::new();
    let mut all = vec![];
    let mut multiple = vec![];
    for record in cohort.iter() {
        let Some(days) = record.duration_days() else {
            ledger.record(
                Entity::Patient(record.patient_id),
                IssueKind::MissingValue,
                None,
                "no valid contact date",
            );
            continue;
        };
        all.push(days as f64);
        if record.valid_date_count > 1 {
            multiple.push(days as f64);
        }
    }
    Analysis::new(
        all.len(),
        ledger,
        DurationPerCase {
            single_date: all.len() - multiple.len(),
            multiple_dates: multiple.len(),
            summary: Descriptive::of(&all),
            summary_multiple: Descriptive::of(&multiple),
        },
    )
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFactorSummary {
    pub total: usize,
    pub with: usize,
    pub without: usize,
    pub unknown: usize,
    /// Patients with both a set and an unset flag (counted under `with`).
    pub inconsistent: usize,
}

pub fn risk_factors(cohort: &Cohort) -> RiskFactorSummary {
    let mut summary = RiskFactorSummary {
        total: cohort.len(),
        with: 0,
        without: 0,
        unknown: 0,
        inconsistent: 0,
    };
    for record in cohort.iter() {
        match record.risk_factor {
            Some(true) => summary.with += 1,
            Some(false) => summary.without += 1,
            None => summary.unknown += 1,
        }
        if record.risk_observations.is_inconsistent() {
            summary.inconsistent += 1;
        }
    }
    summary
}

#[derive(Debug, Clone, Serialize)]
pub struct SexDistribution {
    pub male: usize,
    pub female: usize,
    /// Against an even split.
    pub goodness_of_fit: Outcome<StatResult>,
}

pub fn sex_distribution(cohort: &Cohort) -> Result<Analysis<SexDistribution>> {
    let mut ledger = ExclusionLedger::new();
    let (mut male, mut female) = (0, 0);
    for record in cohort.iter() {
        match valid_sex(record, &mut ledger) {
            Some(Sex::Male) => male += 1,
            Some(Sex::Female) => female += 1,
            None => (),
        }
    }
    let n = male + female;
    let goodness_of_fit = if n < MIN_SEX_TEST_PATIENTS {
        Outcome::not_computed(format!(
            "{} patients with a valid sex, need {}",
            n, MIN_SEX_TEST_PATIENTS
        ))
    } else {
        chi_square_goodness_of_fit(&[male, female], &[0.5, 0.5])?
    };
    Ok(Analysis::new(
        n,
        ledger,
        SexDistribution {
            male,
            female,
            goodness_of_fit,
        },
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct AgeSummary {
    pub summary: Option<Descriptive>,
    pub bands: BandCounts,
}

pub fn age_summary(cohort: &Cohort) -> Analysis<AgeSummary> {
    let mut ledger = ExclusionLedger::new();
    let ages = cohort
        .iter()
        .filter_map(|record| valid_age(record, &mut ledger))
        .collect::<Vec<_>>();
    let bands = Bands::from_cuts(&AGE_BAND_CUTS).bucket(ages.iter().copied());
    Analysis::new(
        ages.len(),
        ledger,
        AgeSummary {
            summary: Descriptive::of(&ages),
            bands,
        },
    )
}

// Group comparisons

pub fn age_by_group(cohort: &Cohort) -> Analysis<ContinuousComparison<HealingGroup>> {
    let mut ledger = ExclusionLedger::new();
    let mut by_group = empty_groups();
    for (record, group) in cohort.classified() {
        if let Some(age) = valid_age(record, &mut ledger) {
            by_group.entry(group).or_insert_with(Vec::new).push(age);
        }
    }
    let included = by_group.values().map(Vec::len).sum();
    Analysis::new(
        included,
        ledger,
        compare_continuous_across_groups(&by_group, ALPHA),
    )
}

pub fn contacts_by_group(cohort: &Cohort) -> Analysis<ContinuousComparison<HealingGroup>> {
    let mut by_group = empty_groups();
    for (record, group) in cohort.classified() {
        by_group
            .entry(group)
            .or_insert_with(Vec::new)
            .push(record.visit_count as f64);
    }
    let included = by_group.values().map(Vec::len).sum();
    Analysis::new(
        included,
        ExclusionLedger::new(),
        compare_continuous_across_groups(&by_group, ALPHA),
    )
}

pub fn sex_by_group(cohort: &Cohort) -> Analysis<CategoricalComparison<HealingGroup, Sex>> {
    let mut ledger = ExclusionLedger::new();
    let table = cohort
        .classified()
        .filter_map(|(record, group)| Some((group, valid_sex(record, &mut ledger)?)))
        .collect::<ContingencyTable<_, _>>();
    Analysis::new(
        table.total(),
        ledger,
        compare_categorical_across_groups(&table),
    )
}

fn empty_groups() -> BTreeMap<HealingGroup, Vec<f64>> {
    HealingGroup::ALL.iter().map(|g| (*g, vec![])).collect()
}

// Correlations

/// Healing group against number of contacts, over every classified patient.
pub fn group_vs_contacts(cohort: &Cohort) -> Result<Analysis<Outcome<Correlation>>> {
    let (groups, contacts): (Vec<_>, Vec<_>) = cohort
        .classified()
        .map(|(record, group)| {
            (
                Some(f64::from(group.id())),
                Some(record.visit_count as f64),
            )
        })
        .unzip();
    Ok(Analysis::new(
        groups.len(),
        ExclusionLedger::new(),
        spearman(&groups, &contacts)?,
    ))
}

/// Healing group against treatment duration, over classified patients with a duration above 0.
pub fn group_vs_duration(cohort: &Cohort) -> Result<Analysis<Outcome<Correlation>>> {
    let mut ledger = ExclusionLedger::new();
    let mut groups = vec![];
    let mut durations = vec![];
    for (record, group) in cohort.classified() {
        let entity = Entity::Patient(record.patient_id);
        match record.duration_days() {
            None => ledger.record(
                entity,
                IssueKind::MissingValue,
                None,
                "no valid contact date",
            ),
            Some(0) => ledger.record(
                entity,
                IssueKind::MissingValue,
                Some(&0),
                "duration of 0 days",
            ),
            Some(days) => {
                groups.push(Some(f64::from(group.id())));
                durations.push(Some(days as f64));
            }
        }
    }
    Ok(Analysis::new(
        groups.len(),
        ledger,
        spearman_with_minimum(&groups, &durations, MIN_DURATION_PATIENTS)?,
    ))
}

// Outcome model

#[derive(Debug, Clone, Serialize)]
pub struct ModelAnalysis {
    pub frame: ModelFrame,
    pub fit: FitOutcome,
    pub diagnostics: Option<Diagnostics>,
    /// Patients whose Pearson residual marks them as outliers.
    pub outlier_patients: Vec<PatientId>,
}

fn status_code(status: Option<Status>) -> Option<f64> {
    status.map(|s| f64::from(s.code()))
}

fn flag(value: Option<bool>) -> Option<f64> {
    value.map(|v| if v { 1. } else { 0. })
}

/// The outcome and the [`MODEL_PREDICTORS`] columns, one row per patient in cohort order.
fn model_columns(cohort: &Cohort) -> (Vec<Option<f64>>, [Vec<Option<f64>>; 7]) {
    let outcome = cohort
        .iter()
        .map(|r| flag(r.outcome_matches_expected))
        .collect::<Vec<_>>();
    let columns = [
        cohort.iter().map(|r| r.pain_score).collect(),
        cohort.iter().map(|r| r.function_score).collect(),
        cohort.iter().map(|r| status_code(r.first_pain_status)).collect(),
        cohort
            .iter()
            .map(|r| status_code(r.first_function_status))
            .collect(),
        cohort.iter().map(|r| flag(r.sex.map(|s| s == Sex::Male))).collect(),
        cohort
            .iter()
            .map(|r| r.age.filter(|age| VALID_AGE.contains(age)))
            .collect(),
        cohort.iter().map(|r| flag(r.first_risk_factor)).collect(),
    ];
    (outcome, columns)
}

/// Whether the course matched the expected recovery, modelled on the first recorded values of
/// every patient.
pub fn outcome_model(cohort: &Cohort) -> Result<Analysis<ModelAnalysis>> {
    let (outcome, columns) = model_columns(cohort);

    let mut ledger = ExclusionLedger::new();
    for (idx, record) in cohort.iter().enumerate() {
        let entity = Entity::Patient(record.patient_id);
        if outcome[idx].is_none() {
            ledger.record(entity, IssueKind::MissingValue, None, "outcome missing");
            continue;
        }
        let Some(missing) = columns.iter().position(|col| col[idx].is_none()) else {
            continue;
        };
        let name = MODEL_PREDICTORS[missing];
        match (name, record.age) {
            ("Alter-Unfall", Some(age)) => ledger.record(
                entity,
                IssueKind::AgeOutOfRange,
                Some(&age),
                "age outside 0-120",
            ),
            ("Alter-Unfall", None) => {
                ledger.record(entity, IssueKind::MissingAge, None, "Age value is null/missing")
            }
            _ => ledger.record(
                entity,
                IssueKind::MissingValue,
                None,
                format!("{} missing", name),
            ),
        }
    }

    let predictors = MODEL_PREDICTORS
        .iter()
        .copied()
        .zip(columns)
        .collect::<Vec<_>>();
    let frame = ModelFrame::new(&outcome, &predictors)?;
    let fit = logistic::fit(&frame);
    let diagnostics = fit.fitted().map(|fit| fit.diagnostics());
    let outlier_patients = diagnostics
        .iter()
        .flat_map(|d| d.residuals.iter())
        .filter(|r| r.outlier)
        .map(|r| cohort[r.row].patient_id)
        .collect();
    Ok(Analysis::new(
        frame.len(),
        ledger,
        ModelAnalysis {
            frame,
            fit,
            diagnostics,
            outlier_patients,
        },
    ))
}

// The whole study

#[derive(Debug, Clone, Serialize)]
pub struct StudyReport {
    pub total_visits: usize,
    pub patients: usize,
    pub group_counts: BTreeMap<HealingGroup, usize>,
    pub unclassified: usize,
    pub aggregation_ledger: ExclusionLedger,
    pub contacts: Analysis<ContactsPerCase>,
    pub duration: Analysis<DurationPerCase>,
    pub risk: RiskFactorSummary,
    pub sex: Analysis<SexDistribution>,
    pub age: Analysis<AgeSummary>,
    pub age_by_group: Analysis<ContinuousComparison<HealingGroup>>,
    pub contacts_by_group: Analysis<ContinuousComparison<HealingGroup>>,
    pub sex_by_group: Analysis<CategoricalComparison<HealingGroup, Sex>>,
    pub group_vs_contacts: Analysis<Outcome<Correlation>>,
    pub group_vs_duration: Analysis<Outcome<Correlation>>,
    pub model: Analysis<ModelAnalysis>,
}

impl StudyReport {
    pub fn run(visits: &Visits) -> Result<Self> {
        let Aggregation { cohort, ledger } = aggregate(visits);
        let cohort = &cohort;

        let ((case_level, comparisons), (correlations, model)) = rayon::join(
            || {
                rayon::join(
                    || -> Result<_> {
                        Ok((
                            contacts_per_case(cohort),
                            duration_per_case(cohort),
                            risk_factors(cohort),
                            sex_distribution(cohort)?,
                            age_summary(cohort),
                        ))
                    },
                    || {
                        (
                            age_by_group(cohort),
                            contacts_by_group(cohort),
                            sex_by_group(cohort),
                        )
                    },
                )
            },
            || {
                rayon::join(
                    || -> Result<_> { Ok((group_vs_contacts(cohort)?, group_vs_duration(cohort)?)) },
                    || outcome_model(cohort),
                )
            },
        );
        let (contacts, duration, risk, sex, age) = case_level?;
        let (age_by_group, contacts_by_group, sex_by_group) = comparisons;
        let (group_vs_contacts, group_vs_duration) = correlations?;
        let model = model?;

        let group_counts = cohort.group_counts();
        let unclassified = cohort.len() - group_counts.values().sum::<usize>();
        event!(
            Level::INFO,
            "study complete: {} patients, model {}",
            cohort.len(),
            if model.result.fit.succeeded() {
                "fitted"
            } else {
                "failed"
            }
        );
        Ok(StudyReport {
            total_visits: visits.len(),
            patients: cohort.len(),
            group_counts,
            unclassified,
            aggregation_ledger: ledger,
            contacts,
            duration,
            risk,
            sex,
            age,
            age_by_group,
            contacts_by_group,
            sex_by_group,
            group_vs_contacts,
            group_vs_duration,
            model,
        })
    }

    /// Every result as a titled terminal table, in reading order.
    pub fn term_tables(&self) -> Vec<(String, tdt::Table)> {
        let mut tables = vec![
            ("Overview".to_string(), self.overview_table()),
            (
                self.contacts.caption("Contacts per case"),
                self.contacts_table(),
            ),
            (
                self.duration.caption("Treatment duration (days)"),
                self.duration_table(),
            ),
            ("Risk factor".to_string(), self.risk_table()),
            (self.sex.caption("Sex"), self.sex_table()),
            (self.age.caption("Age at incident"), self.age_table()),
            (
                self.age_by_group.caption("Age by healing group"),
                self.age_by_group.result.term_table(),
            ),
            (
                self.contacts_by_group.caption("Contacts by healing group"),
                self.contacts_by_group.result.term_table(),
            ),
            (
                self.sex_by_group.caption("Sex by healing group"),
                self.sex_by_group.result.term_table(),
            ),
            (
                "Correlations (Spearman)".to_string(),
                self.correlation_table(),
            ),
            (
                "Outcome model: complete cases".to_string(),
                self.model.result.frame.exclusion_table(),
            ),
        ];
        let model_caption = self.model.caption("Outcome model: Verlauf_entspricht_NBE");
        match &self.model.result.fit {
            FitOutcome::Fitted(fit) => tables.push((model_caption, fit.term_table())),
            FitOutcome::Failed { error, n } => {
                use tdt::{Cell, Row, Table};
                tables.push((
                    model_caption,
                    Table::new().with_row(
                        Row::new()
                            .with_cell(Cell::from("Fit failed"))
                            .with_cell(Cell::from(format!("{} (n = {})", error, n))),
                    ),
                ));
            }
        }
        if let Some(diagnostics) = &self.model.result.diagnostics {
            tables.push(("Model diagnostics".to_string(), diagnostics.term_table()));
        }
        tables
    }

    fn overview_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let classified = self.patients - self.unclassified;
        let mut table = Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Visits"))
                    .with_cell(Cell::from(self.total_visits.to_string())),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Patients"))
                    .with_cell(Cell::from(self.patients.to_string())),
            );
        for (group, count) in &self.group_counts {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(group.to_string()))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        count,
                        percentage(*count, classified)
                    ))),
            );
        }
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Without status data"))
                .with_cell(Cell::from(self.unclassified.to_string())),
        );
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Data quality entries"))
                .with_cell(Cell::from(self.aggregation_ledger.len().to_string())),
        );
        table
    }

    fn contacts_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let r = &self.contacts.result;
        let mut table = Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Total contacts"))
                    .with_cell(Cell::from(r.total_contacts.to_string())),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Summary"))
                    .with_cell(Cell::from(describe(r.summary.as_ref()))),
            );
        for (contacts, patients) in &r.distribution {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(format!("{} contact(s)", contacts)))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        patients,
                        percentage(*patients, self.contacts.included)
                    ))),
            );
        }
        table
    }

    fn duration_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let r = &self.duration.result;
        Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Single contact date"))
                    .with_cell(Cell::from(r.single_date.to_string())),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Multiple contact dates"))
                    .with_cell(Cell::from(r.multiple_dates.to_string())),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("All"))
                    .with_cell(Cell::from(describe(r.summary.as_ref()))),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Multiple dates only"))
                    .with_cell(Cell::from(describe(r.summary_multiple.as_ref()))),
            )
    }

    fn risk_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let r = &self.risk;
        let mut table = Table::new();
        for (label, count) in [
            ("With risk factor", r.with),
            ("Without risk factor", r.without),
            ("Unknown", r.unknown),
            ("Inconsistent across visits", r.inconsistent),
        ] {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(label))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        count,
                        percentage(count, r.total)
                    ))),
            );
        }
        table
    }

    fn sex_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let r = &self.sex.result;
        Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from(Sex::Male.to_string()))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        r.male,
                        percentage(r.male, self.sex.included)
                    ))),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from(Sex::Female.to_string()))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        r.female,
                        percentage(r.female, self.sex.included)
                    ))),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Even split"))
                    .with_cell(Cell::from(r.goodness_of_fit.to_string())),
            )
    }

    fn age_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let r = &self.age.result;
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Summary"))
                .with_cell(Cell::from(describe(r.summary.as_ref()))),
        );
        for (band, count) in &r.bands.counts {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(band.to_string()))
                    .with_cell(Cell::from(format!(
                        "{} ({:.1}%)",
                        count,
                        percentage(*count, self.age.included)
                    ))),
            );
        }
        table
    }

    fn correlation_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        Table::new()
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Healing group vs contacts"))
                    .with_cell(Cell::from(self.group_vs_contacts.result.to_string())),
            )
            .with_row(
                Row::new()
                    .with_cell(Cell::from("Healing group vs duration"))
                    .with_cell(Cell::from(self.group_vs_duration.result.to_string())),
            )
    }
}

fn describe(summary: Option<&Descriptive>) -> String {
    match summary {
        Some(d) => format!(
            "n = {}, mean = {:.2}, median = {:.2}, SD = {:.2}, range = {:.0}-{:.0}",
            d.n, d.mean, d.median, d.std, d.min, d.max
        ),
        None => "no data".to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cohort::test::visits;

    #[test]
    fn age_exclusions_are_per_analysis() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,1",
            "2,2021-01-01,1,2,1,1,,w,0,0",
            "3,2021-01-01,0,2,1,1,130,w,1,1",
            "4,2021-01-01,,,1,1,40,m,,",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);

        let age = age_summary(&cohort);
        assert_eq!(age.included, 2);
        assert_eq!(age.exclusions.count(IssueKind::MissingAge), 1);
        assert_eq!(age.exclusions.count(IssueKind::AgeOutOfRange), 1);

        // patient 4 has no status, so is not part of the group comparison at all
        let by_group = age_by_group(&cohort);
        assert_eq!(by_group.included, 1);
        assert_eq!(by_group.exclusions.excluded_count(), 2);
        assert!(!by_group.result.omnibus.is_computed());

        let contacts = contacts_per_case(&cohort);
        assert_eq!(contacts.included, 4);
        assert_eq!(contacts.result.distribution[&1], 4);
    }

    #[test]
    fn sex_test_needs_five_patients() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,1",
            "2,2021-01-01,2,2,1,1,30,w,0,1",
            "3,2021-01-01,2,2,1,1,30,,0,1",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);
        let sex = sex_distribution(&cohort).unwrap();
        assert_eq!(sex.included, 2);
        assert_eq!(sex.exclusions.len(), 1);
        assert!(!sex.result.goodness_of_fit.is_computed());
    }

    #[test]
    fn duration_and_risk() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,1",
            "1,2021-01-11,2,2,1,1,30,m,1,1",
            "2,2021-01-01,2,2,1,1,30,w,0,1",
            "3,,2,2,1,1,30,w,,1",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);
        let duration = duration_per_case(&cohort);
        assert_eq!(duration.included, 2);
        assert_eq!(duration.result.single_date, 1);
        assert_eq!(duration.result.multiple_dates, 1);
        assert_eq!(duration.result.summary_multiple.unwrap().mean, 10.);
        assert_eq!(duration.result.summary.unwrap().mean, 5.);

        let risk = risk_factors(&cohort);
        assert_eq!(
            (risk.with, risk.without, risk.unknown, risk.inconsistent),
            (1, 1, 1, 1)
        );
    }

    #[test]
    fn duration_correlation_needs_enough_patients() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,1",
            "1,2021-01-05,2,2,1,1,30,m,0,1",
            "2,2021-01-01,1,2,1,1,30,w,0,1",
            "2,2021-01-21,1,2,1,1,30,w,0,1",
            "3,2021-01-01,0,2,1,1,30,w,0,1",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);
        let duration = group_vs_duration(&cohort).unwrap();
        assert_eq!(duration.included, 2);
        assert_eq!(duration.exclusions.len(), 1);
        assert!(!duration.result.is_computed());
    }

    #[test]
    fn model_exclusions_follow_predictor_order() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,",
            "2,2021-01-01,2,2,,1,30,m,0,1",
            "3,2021-01-01,2,2,1,1,150,w,0,1",
            "4,2021-01-01,2,2,1,1,30,w,0,0",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);
        let model = outcome_model(&cohort).unwrap();
        let frame = &model.result.frame;
        assert_eq!(frame.starting, 3);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.steps[1].variable, "FLScore");
        assert_eq!(frame.steps[1].dropped, 1);
        assert_eq!(frame.steps[5].dropped, 1);
        assert_eq!(model.exclusions.count(IssueKind::AgeOutOfRange), 1);
        assert_eq!(model.exclusions.excluded_count(), 3);
        assert!(!model.result.fit.succeeded());
        assert!(model.result.diagnostics.is_none());
    }

    #[test]
    fn model_uses_first_recorded_risk_factor() {
        let visits = visits(&[
            "1,2021-01-01,2,2,1,1,30,m,0,1",
            "2,2021-01-01,2,2,1,1,30,w,,1",
            "1,2021-01-08,2,2,1,1,30,m,1,1",
            "2,2021-01-08,2,2,1,1,30,w,1,1",
        ]);
        let Aggregation { cohort, .. } = aggregate(&visits);
        let (_, columns) = model_columns(&cohort);
        let risk = &columns[6];
        assert_eq!(MODEL_PREDICTORS[6], "Risk Factor");
        assert_eq!(risk, &vec![Some(0.), Some(1.)]);

        // the risk summary still counts any positive visit
        assert_eq!(risk_factors(&cohort).with, 2);
    }
}
