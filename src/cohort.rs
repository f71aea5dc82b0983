//! Patient-level aggregation of the visit dataset.
//!
//! Every visit of a patient is folded into a single immutable [`PatientRecord`]. Per-patient
//! attributes which the extract repeats on every row (age, sex, scores, outcome) are taken from
//! the first visit, in source order, that has a value. Anything suspicious found on the way is
//! written to the [`ExclusionLedger`].
use crate::{
    healing::{classify, HealingGroup},
    ledger::{Entity, ExclusionLedger, IssueKind},
    ContactDate, PatientId, Sex, Status, Visit, Visits,
};
use chrono::NaiveDate;
use qu::ick_use::*;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Deref,
};
use term_data_table as tdt;

/// How often the risk-factor flag was seen set and unset across a patient's visits.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskFactorObservations {
    pub yes: usize,
    pub no: usize,
}

impl RiskFactorObservations {
    /// Any positive observation makes the patient a risk-factor patient.
    pub fn resolve(&self) -> Option<bool> {
        if self.yes > 0 {
            Some(true)
        } else if self.no > 0 {
            Some(false)
        } else {
            None
        }
    }

    pub fn is_inconsistent(&self) -> bool {
        self.yes > 0 && self.no > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    pub patient_id: PatientId,
    /// Number of visits, including those with an invalid or missing date.
    pub visit_count: usize,
    /// Every valid status value, function status before pain status within a visit.
    pub statuses: Vec<Status>,
    pub first_function_status: Option<Status>,
    pub first_pain_status: Option<Status>,
    pub age: Option<f64>,
    pub sex: Option<Sex>,
    pub function_score: Option<f64>,
    pub pain_score: Option<f64>,
    /// Set if any visit has the risk factor.
    pub risk_factor: Option<bool>,
    /// The first recorded risk-factor value, in source order.
    pub first_risk_factor: Option<bool>,
    pub risk_observations: RiskFactorObservations,
    pub outcome_matches_expected: Option<bool>,
    pub first_contact_date: Option<NaiveDate>,
    pub last_contact_date: Option<NaiveDate>,
    pub valid_date_count: usize,
}

impl PatientRecord {
    /// Days between the first and last valid contact.
    ///
    /// `None` if the patient has no valid contact date, `0` if only one.
    pub fn duration_days(&self) -> Option<i64> {
        Some((self.last_contact_date? - self.first_contact_date?).num_days())
    }

    /// `None` for patients without any status observation.
    pub fn healing_group(&self) -> Option<HealingGroup> {
        if self.statuses.is_empty() {
            None
        } else {
            Some(classify(&self.statuses))
        }
    }
}

/// Accumulator for the visits of a single patient.
#[derive(Default)]
struct PatientFold {
    visit_count: usize,
    statuses: Vec<Status>,
    first_function_status: Option<Status>,
    first_pain_status: Option<Status>,
    age: Option<f64>,
    sex: Option<Sex>,
    sexes_seen: BTreeSet<Sex>,
    function_score: Option<f64>,
    pain_score: Option<f64>,
    risk_observations: RiskFactorObservations,
    first_risk_factor: Option<bool>,
    outcome_matches_expected: Option<bool>,
    first_contact_date: Option<NaiveDate>,
    last_contact_date: Option<NaiveDate>,
    valid_date_count: usize,
}

impl PatientFold {
    fn visit(mut self, patient_id: PatientId, visit: &Visit, ledger: &mut ExclusionLedger) -> Self {
        let entity = Entity::Patient(patient_id);
        self.visit_count += 1;

        for (column, raw, first) in [
            (
                "StatusFL",
                &visit.function_status,
                &mut self.first_function_status,
            ),
            ("StatusP", &visit.pain_status, &mut self.first_pain_status),
        ] {
            let Some(raw) = raw else { continue };
            match raw.parse::<Status>() {
                Ok(status) => {
                    self.statuses.push(status);
                    first.get_or_insert(status);
                }
                Err(e) => ledger.record(
                    entity,
                    IssueKind::InvalidStatus,
                    Some(raw),
                    format!("{} in row {}: {}", column, visit.row, e),
                ),
            }
        }

        match &visit.contact_date {
            ContactDate::Valid(date) => {
                self.valid_date_count += 1;
                self.first_contact_date = Some(match self.first_contact_date {
                    Some(first) => first.min(*date),
                    None => *date,
                });
                self.last_contact_date = Some(match self.last_contact_date {
                    Some(last) => last.max(*date),
                    None => *date,
                });
            }
            ContactDate::Invalid(raw) => ledger.record(
                entity,
                IssueKind::InvalidContactDate,
                Some(raw),
                format!("unparseable contact date in row {}", visit.row),
            ),
            ContactDate::Missing => (),
        }

        if let Some(raw) = &visit.sex {
            match raw.parse::<Sex>() {
                Ok(sex) => {
                    self.sexes_seen.insert(sex);
                    self.sex.get_or_insert(sex);
                }
                Err(e) => ledger.record(
                    entity,
                    IssueKind::InvalidSex,
                    Some(raw),
                    format!("row {}: {}", visit.row, e),
                ),
            }
        }

        for (column, raw) in [
            ("FLScore", visit.function_score.invalid()),
            ("P", visit.pain_score.invalid()),
            ("Alter-Unfall", visit.age.invalid()),
            ("Risk Factor", visit.risk_factor.invalid()),
            (
                "Verlauf_entspricht_NBE",
                visit.outcome_matches_expected.invalid(),
            ),
        ] {
            if let Some(raw) = raw {
                ledger.record(
                    entity,
                    IssueKind::InvalidValue,
                    Some(raw),
                    format!("{} in row {} treated as missing", column, visit.row),
                );
            }
        }

        let risk_factor = visit.risk_factor.valid();
        match risk_factor {
            Some(true) => self.risk_observations.yes += 1,
            Some(false) => self.risk_observations.no += 1,
            None => (),
        }

        first_non_null(&mut self.first_risk_factor, risk_factor);
        first_non_null(&mut self.age, visit.age.valid());
        first_non_null(&mut self.function_score, visit.function_score.valid());
        first_non_null(&mut self.pain_score, visit.pain_score.valid());
        first_non_null(
            &mut self.outcome_matches_expected,
            visit.outcome_matches_expected.valid(),
        );
        self
    }

    fn finish(self, patient_id: PatientId, ledger: &mut ExclusionLedger) -> PatientRecord {
        let entity = Entity::Patient(patient_id);
        if self.sexes_seen.len() > 1 {
            let seen = self
                .sexes_seen
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            ledger.record(
                entity,
                IssueKind::InconsistentSex,
                Some(&seen),
                "different sexes recorded across visits",
            );
        }
        if self.risk_observations.is_inconsistent() {
            ledger.record(
                entity,
                IssueKind::InconsistentRiskFactor,
                Some(&format!(
                    "{} yes, {} no",
                    self.risk_observations.yes, self.risk_observations.no
                )),
                "risk factor both set and unset across visits",
            );
        }
        if self.statuses.is_empty() {
            ledger.record(
                entity,
                IssueKind::NoStatusData,
                None,
                "Both StatusFL and StatusP missing for all visits",
            );
        }

        PatientRecord {
            patient_id,
            visit_count: self.visit_count,
            statuses: self.statuses,
            first_function_status: self.first_function_status,
            first_pain_status: self.first_pain_status,
            age: self.age,
            sex: self.sex,
            function_score: self.function_score,
            pain_score: self.pain_score,
            risk_factor: self.risk_observations.resolve(),
            first_risk_factor: self.first_risk_factor,
            risk_observations: self.risk_observations,
            outcome_matches_expected: self.outcome_matches_expected,
            first_contact_date: self.first_contact_date,
            last_contact_date: self.last_contact_date,
            valid_date_count: self.valid_date_count,
        }
    }
}

fn first_non_null<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// The result of [`aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub cohort: Cohort,
    pub ledger: ExclusionLedger,
}

/// Fold the visits into one record per patient.
///
/// Rows without an identifier are recorded in the ledger and otherwise ignored. The output is
/// deterministic for a given input.
pub fn aggregate(visits: &Visits) -> Aggregation {
    let mut ledger = ExclusionLedger::new();
    for visit in visits.null_identifier_rows() {
        ledger.record(
            Entity::Row(visit.row),
            IssueKind::InvalidIdentifier,
            None,
            "Null Unique ID",
        );
    }

    let records = visits
        .patient_ids()
        .map(|patient_id| {
            visits
                .visits_for_patient(patient_id)
                .fold(PatientFold::default(), |fold, visit| {
                    fold.visit(patient_id, visit, &mut ledger)
                })
                .finish(patient_id, &mut ledger)
        })
        .collect::<Vec<_>>();

    let cohort = Cohort::new(records);
    event!(
        Level::INFO,
        "aggregated {} patients ({} classified, {} without status data)",
        cohort.len(),
        cohort.classified().count(),
        ledger.count(IssueKind::NoStatusData)
    );
    ledger.log_summary("aggregation");
    Aggregation { cohort, ledger }
}

/// All patients with a non-null identifier, in order of first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    els: Vec<PatientRecord>,
    id_idx: BTreeMap<PatientId, usize>,
}

impl Cohort {
    fn new(els: Vec<PatientRecord>) -> Self {
        let id_idx = els
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.patient_id, idx))
            .collect();
        Cohort { els, id_idx }
    }

    pub fn find_by_id(&self, patient_id: PatientId) -> Option<&PatientRecord> {
        self.id_idx.get(&patient_id).map(|idx| &self.els[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientRecord> + '_ {
        self.els.iter()
    }

    /// Patients that have a healing group, together with it.
    pub fn classified(&self) -> impl Iterator<Item = (&PatientRecord, HealingGroup)> + '_ {
        self.els
            .iter()
            .filter_map(|record| Some((record, record.healing_group()?)))
    }

    /// Patient count per healing group. Every group is present, possibly with a count of 0.
    pub fn group_counts(&self) -> BTreeMap<HealingGroup, usize> {
        let mut counts = HealingGroup::ALL
            .iter()
            .map(|group| (*group, 0))
            .collect::<BTreeMap<_, _>>();
        for (_, group) in self.classified() {
            *counts.entry(group).or_insert(0) += 1;
        }
        counts
    }

    pub fn group_table(&self) -> tdt::Table {
        use tdt::{Cell, Row, Table};
        let counts = self.group_counts();
        let classified: usize = counts.values().sum();
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Group"))
                .with_cell(Cell::from("Patients"))
                .with_cell(Cell::from("%")),
        );
        for (group, count) in counts {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(group.to_string()))
                    .with_cell(Cell::from(count.to_string()))
                    .with_cell(Cell::from(format!(
                        "{:.1}",
                        crate::stats::percentage(count, classified)
                    ))),
            );
        }
        table.add_row(
            Row::new()
                .with_cell(Cell::from("Without status data"))
                .with_cell(Cell::from((self.len() - classified).to_string()))
                .with_cell(Cell::from("")),
        );
        table
    }
}

impl Deref for Cohort {
    type Target = [PatientRecord];
    fn deref(&self) -> &Self::Target {
        &self.els
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) const HEADER: &str =
        "Unique ID,Kontaktdatum,StatusFL,StatusP,FLScore,P,Alter-Unfall,Geschlecht,Risk Factor,Verlauf_entspricht_NBE\n";

    pub(crate) fn visits(rows: &[&str]) -> Visits {
        let mut csv = String::from(HEADER);
        for row in rows {
            csv.push_str(row);
            csv.push('\n');
        }
        Visits::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn folds_visits_into_records() {
        let visits = visits(&[
            "1,2021-01-10,verbessert,unverändert,,4,,w,0,",
            "2,2021-01-11,2,2,3,3,50,m,,1",
            "1,2021-01-01,verbessert,verbessert,5,2,34,w,1,0",
            "1,2021-02-01,,,,,34,w,,",
        ]);
        let Aggregation { cohort, ledger } = aggregate(&visits);
        assert_eq!(cohort.len(), 2);
        // first appearance order
        assert_eq!(cohort[0].patient_id, 1);

        let p1 = cohort.find_by_id(1).unwrap();
        assert_eq!(p1.visit_count, 3);
        assert_eq!(
            p1.statuses,
            vec![
                Status::Improved,
                Status::Unchanged,
                Status::Improved,
                Status::Improved
            ]
        );
        assert_eq!(p1.first_pain_status, Some(Status::Unchanged));
        assert_eq!(p1.healing_group(), Some(HealingGroup::Stagnation));
        // first non-null value per column
        assert_eq!(p1.age, Some(34.));
        assert_eq!(p1.function_score, Some(5.));
        assert_eq!(p1.pain_score, Some(4.));
        assert_eq!(p1.outcome_matches_expected, Some(false));
        assert_eq!(p1.sex, Some(Sex::Female));
        assert_eq!(p1.duration_days(), Some(31));
        assert_eq!(p1.risk_factor, Some(true));
        assert_eq!(p1.first_risk_factor, Some(false));
        assert!(p1.risk_observations.is_inconsistent());
        assert_eq!(ledger.count(IssueKind::InconsistentRiskFactor), 1);

        let p2 = cohort.find_by_id(2).unwrap();
        assert_eq!(p2.duration_days(), Some(0));
        assert_eq!(p2.risk_factor, None);
        assert_eq!(p2.healing_group(), Some(HealingGroup::NoStagnation));
    }

    #[test]
    fn records_data_quality_issues() {
        let visits = visits(&[
            ",2021-01-01,2,2,,,30,m,0,1",
            "5,,,,,,40,m,0,1",
            "5,garbage,,,,,40,w,0,1",
            "6,2021-01-01,better,0,,,20,x,1,1",
        ]);
        let Aggregation { cohort, ledger } = aggregate(&visits);
        assert_eq!(cohort.len(), 2);
        assert_eq!(ledger.count(IssueKind::InvalidIdentifier), 1);
        assert_eq!(ledger.iter().next().unwrap().entity, Entity::Row(0));
        assert_eq!(ledger.count(IssueKind::NoStatusData), 1);
        assert_eq!(ledger.count(IssueKind::InvalidContactDate), 1);
        assert_eq!(ledger.count(IssueKind::InconsistentSex), 1);
        assert_eq!(ledger.count(IssueKind::InvalidStatus), 1);
        assert_eq!(ledger.count(IssueKind::InvalidSex), 1);

        let p5 = cohort.find_by_id(5).unwrap();
        assert_eq!(p5.healing_group(), None);
        assert_eq!(p5.duration_days(), None);
        assert_eq!(p5.sex, Some(Sex::Male));

        let p6 = cohort.find_by_id(6).unwrap();
        assert_eq!(p6.statuses, vec![Status::Worse]);
        assert_eq!(p6.sex, None);

        let counts = cohort.group_counts();
        assert_eq!(counts[&HealingGroup::Worsening], 1);
        assert_eq!(counts[&HealingGroup::NoStagnation], 0);
        assert_eq!(
            counts.values().sum::<usize>() + ledger.count(IssueKind::NoStatusData),
            visits.distinct_patient_count()
        );
    }

    #[test]
    fn unparseable_values_count_as_missing() {
        let visits = visits(&[
            "1,2021-01-01,2,2,unbekannt,3,40,w,ja,1",
            "1,2021-01-08,2,2,4,3,40,w,0,1",
            "2,2021-01-01,1,2,5,3,?,m,1,2",
        ]);
        let Aggregation { cohort, ledger } = aggregate(&visits);
        assert_eq!(cohort.len(), 2);
        assert_eq!(ledger.count(IssueKind::InvalidValue), 4);
        assert_eq!(ledger.excluded_count(), 0);

        let p1 = cohort.find_by_id(1).unwrap();
        assert_eq!(p1.function_score, Some(4.));
        assert_eq!(p1.first_risk_factor, Some(false));
        assert_eq!(p1.risk_observations.no, 1);
        assert_eq!(p1.risk_observations.yes, 0);

        let p2 = cohort.find_by_id(2).unwrap();
        assert_eq!(p2.age, None);
        assert_eq!(p2.outcome_matches_expected, None);
        assert_eq!(p2.healing_group(), Some(HealingGroup::Stagnation));
    }

    #[test]
    fn aggregation_is_deterministic() {
        let visits = visits(&[
            "3,2021-01-01,2,1,,,30,m,0,1",
            "4,2021-01-02,0,,,,31,w,1,0",
            "3,2021-01-05,2,2,,,30,m,0,1",
        ]);
        let a = aggregate(&visits);
        let b = aggregate(&visits);
        assert_eq!(a.cohort, b.cohort);
        assert_eq!(a.ledger, b.ledger);
    }
}
