//! Cohort aggregation and statistical inference for repeated-visit recovery data.
//!
//! The flow through the crate is
//!
//! 1. load the visit extract into [`Visits`],
//! 2. fold it into one [`cohort::PatientRecord`] per patient with [`cohort::aggregate`], which also
//!    fills an [`ledger::ExclusionLedger`],
//! 3. derive each patient's [`healing::HealingGroup`] from their status history,
//! 4. run the fixed comparisons in [`study`] (group statistics, correlation, logistic model).
//!
//! Everything after loading is in-memory and deterministic.
pub mod band;
pub mod cohort;
pub mod correlation;
pub mod healing;
pub mod ledger;
mod linalg;
pub mod logistic;
pub mod stats;
pub mod study;
mod util;

pub use anyhow::{Context, Error};
use chrono::NaiveDate;
use itertools::Either;
use qu::ick_use::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt, fs, io, iter,
    ops::Deref,
    path::Path,
    str::FromStr,
    sync::Arc,
};

pub use crate::util::{header, ResultExt};
use crate::util::{contact_date, flag_01, number, opt_patient_id, optional_string};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type PatientId = u64;

/// Columns the visit extract must provide. Checked before any row is parsed.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "Unique ID",
    "StatusFL",
    "StatusP",
    "Kontaktdatum",
    "Alter-Unfall",
    "Geschlecht",
    "FLScore",
    "P",
    "Risk Factor",
    "Verlauf_entspricht_NBE",
];

#[derive(Debug, Deserialize)]
struct VisitRaw {
    #[serde(rename = "Unique ID", deserialize_with = "opt_patient_id")]
    patient_id: Option<PatientId>,
    #[serde(rename = "Kontaktdatum", deserialize_with = "contact_date")]
    contact_date: ContactDate,
    #[serde(rename = "StatusFL", deserialize_with = "optional_string")]
    function_status: Option<ArcStr>,
    #[serde(rename = "StatusP", deserialize_with = "optional_string")]
    pain_status: Option<ArcStr>,
    #[serde(rename = "FLScore", deserialize_with = "number")]
    function_score: Reading<f64>,
    #[serde(rename = "P", deserialize_with = "number")]
    pain_score: Reading<f64>,
    #[serde(rename = "Alter-Unfall", deserialize_with = "number")]
    age: Reading<f64>,
    #[serde(rename = "Geschlecht", deserialize_with = "optional_string")]
    sex: Option<ArcStr>,
    #[serde(rename = "Risk Factor", deserialize_with = "flag_01")]
    risk_factor: Reading<bool>,
    #[serde(rename = "Verlauf_entspricht_NBE", deserialize_with = "flag_01")]
    outcome_matches_expected: Reading<bool>,
}

/// A row in the visit dataset: one clinical contact.
///
/// Status and sex cells are kept as the text found in the extract. They are mapped onto
/// [`Status`] and [`Sex`] exactly once, during aggregation, so that unrecognised values end up
/// in the exclusion ledger rather than disappearing at load time. Numeric and 0/1 cells that do
/// not parse are kept the same way, as [`Reading::Invalid`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    /// Position of the row in the source file (0 is the first data row).
    pub row: usize,
    pub patient_id: Option<PatientId>,
    pub contact_date: ContactDate,
    /// Function-limitation status (`StatusFL`).
    pub function_status: Option<ArcStr>,
    /// Pain status (`StatusP`).
    pub pain_status: Option<ArcStr>,
    pub function_score: Reading<f64>,
    pub pain_score: Reading<f64>,
    /// Age at the date of the incident.
    pub age: Reading<f64>,
    pub sex: Option<ArcStr>,
    pub risk_factor: Reading<bool>,
    /// Whether the course of treatment matched the expected recovery.
    pub outcome_matches_expected: Reading<bool>,
}

impl Visit {
    fn from_raw(row: usize, raw: VisitRaw) -> Self {
        Visit {
            row,
            patient_id: raw.patient_id,
            contact_date: raw.contact_date,
            function_status: raw.function_status,
            pain_status: raw.pain_status,
            function_score: raw.function_score,
            pain_score: raw.pain_score,
            age: raw.age,
            sex: raw.sex,
            risk_factor: raw.risk_factor,
            outcome_matches_expected: raw.outcome_matches_expected,
        }
    }
}

/// The parsed list of visits, with a pre-built index for the patient identifier.
///
/// Rows keep their source order. Patients are listed in the order they are first seen.
#[derive(Debug, Clone)]
pub struct Visits {
    els: Arc<Vec<Visit>>,
    id_idx: BTreeMap<PatientId, Vec<usize>>,
    first_seen: Vec<PatientId>,
}

impl Visits {
    /// Load the visit extract from a CSV file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .with_context(|| format!("unable to open \"{}\"", path.display()))?;
        Self::from_reader(io::BufReader::new(file))
            .with_context(|| format!("while loading \"{}\"", path.display()))
    }

    /// Parse a visit extract from any CSV source.
    ///
    /// Fails before reading any rows if a required column is absent.
    pub fn from_reader(reader: impl io::Read) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        check_columns(reader.headers()?)?;

        let els = reader
            .into_deserialize::<VisitRaw>()
            .enumerate()
            .map(|(row, raw)| {
                raw.map(|raw| Visit::from_raw(row, raw))
                    .with_context(|| format!("unable to parse data row {}", row))
            })
            .collect::<Result<Vec<_>>>()?;
        let this = Self::new(els);
        event!(
            Level::INFO,
            "loaded {} visits for {} patients",
            this.len(),
            this.first_seen.len()
        );
        Ok(this)
    }

    pub fn visits_for_patient(
        &self,
        patient_id: PatientId,
    ) -> impl Iterator<Item = &Visit> + Clone + '_ {
        let idxs = match self.id_idx.get(&patient_id) {
            Some(idxs) => idxs,
            None => return Either::Left(iter::empty()),
        };
        Either::Right(idxs.iter().map(|idx| &self.els[*idx]))
    }

    /// Distinct non-null patient identifiers, in the order they first appear.
    pub fn patient_ids(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.first_seen.iter().copied()
    }

    pub fn distinct_patient_count(&self) -> usize {
        self.first_seen.len()
    }

    /// Rows without a usable patient identifier.
    pub fn null_identifier_rows(&self) -> impl Iterator<Item = &Visit> + '_ {
        self.els.iter().filter(|visit| visit.patient_id.is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Visit> + '_ {
        self.els.iter()
    }

    fn new(els: Vec<Visit>) -> Self {
        let mut this = Visits {
            els: Arc::new(els),
            id_idx: BTreeMap::new(),
            first_seen: vec![],
        };
        this.rebuild_index();
        this
    }

    fn rebuild_index(&mut self) {
        self.id_idx.clear();
        self.first_seen.clear();
        for (idx, visit) in self.els.iter().enumerate() {
            let Some(patient_id) = visit.patient_id else {
                continue;
            };
            let idxs = self.id_idx.entry(patient_id).or_insert_with(Vec::new);
            if idxs.is_empty() {
                self.first_seen.push(patient_id);
            }
            idxs.push(idx);
        }
    }
}

impl Deref for Visits {
    type Target = [Visit];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl<'a> IntoIterator for &'a Visits {
    type IntoIter = <&'a [Visit] as IntoIterator>::IntoIter;
    type Item = &'a Visit;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

fn check_columns(headers: &csv::StringRecord) -> Result {
    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect::<Vec<_>>();
    ensure!(
        missing.is_empty(),
        "dataset is missing required columns: {}",
        missing.join(", ")
    );
    Ok(())
}

// Sub-types

/// The date of a contact as found in the extract.
///
/// Unparseable dates are kept so they can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContactDate {
    Missing,
    Valid(NaiveDate),
    Invalid(ArcStr),
}

impl ContactDate {
    pub fn valid(&self) -> Option<NaiveDate> {
        match self {
            ContactDate::Valid(date) => Some(*date),
            _ => None,
        }
    }
}

/// A numeric or 0/1 cell as found in the extract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Reading<T> {
    Missing,
    Valid(T),
    Invalid(ArcStr),
}

impl<T: Copy> Reading<T> {
    pub fn valid(&self) -> Option<T> {
        match self {
            Reading::Valid(v) => Some(*v),
            _ => None,
        }
    }
}

impl<T> Reading<T> {
    /// The original text of an unparseable cell.
    pub fn invalid(&self) -> Option<&ArcStr> {
        match self {
            Reading::Invalid(raw) => Some(raw),
            _ => None,
        }
    }
}

/// Ordinal change in function limitation or pain since the previous contact.
///
/// The discriminants are the codes used in the extract.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Status {
    Worse = 0,
    Unchanged = 1,
    Improved = 2,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Worse => "worse",
            Status::Unchanged => "unchanged",
            Status::Improved => "improved",
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = Error;
    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Status::Worse,
            1 => Status::Unchanged,
            2 => Status::Improved,
            _ => bail!("status code {} is not one of 0, 1, 2", code),
        })
    }
}

impl FromStr for Status {
    type Err = Error;
    /// Accepts the German labels used by the extract, their English equivalents, and the
    /// integer codes (which spreadsheet exports sometimes write as `2.0`).
    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        match input.to_lowercase().as_str() {
            "verschlechtert" | "worse" => return Ok(Status::Worse),
            "unverändert" | "unveraendert" | "unchanged" => return Ok(Status::Unchanged),
            "verbessert" | "improved" => return Ok(Status::Improved),
            _ => (),
        }
        match input.parse::<f64>() {
            Ok(v) if v.fract() == 0. && (0. ..=2.).contains(&v) => Status::try_from(v as u8),
            _ => bail!("didn't recognise status \"{}\"", input),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sex is encoded 'm' or 'w' in the extract.
///
/// Ordering is arbitrary.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Hash, Ord, PartialOrd)]
pub enum Sex {
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "w")]
    Female,
}

impl FromStr for Sex {
    type Err = Error;
    fn from_str(input: &str) -> Result<Self> {
        Ok(match input.trim().to_lowercase().as_str() {
            "m" | "male" | "männlich" | "maennlich" => Sex::Male,
            "w" | "f" | "female" | "weiblich" => Sex::Female,
            _ => bail!("didn't recognise sex \"{}\"", input),
        })
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("Male"),
            Sex::Female => f.write_str("Female"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cohort::test::HEADER;

    #[test]
    fn missing_columns_are_reported_together() {
        let csv = "Unique ID,StatusFL,Kontaktdatum\n1,2,2021-01-01\n";
        let err = Visits::from_reader(csv.as_bytes()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("StatusP"), "{}", msg);
        assert!(msg.contains("Verlauf_entspricht_NBE"), "{}", msg);
        assert!(!msg.contains("Kontaktdatum"), "{}", msg);
    }

    #[test]
    fn parses_quirky_cells() {
        let csv = format!(
            "{}{}{}{}",
            HEADER,
            "7.0,03.02.2021,verbessert,1,2,3.5,44,w,0,1\n",
            ",2021-02-04,2,2,,,,m,,\n",
            "7,not a date,NaN,,1,1,44,m,1.0,\n",
        );
        let visits = Visits::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(visits.len(), 3);
        assert_eq!(visits.distinct_patient_count(), 1);
        assert_eq!(visits.null_identifier_rows().count(), 1);

        let first = &visits[0];
        assert_eq!(first.patient_id, Some(7));
        assert_eq!(
            first.contact_date,
            ContactDate::Valid(NaiveDate::from_ymd_opt(2021, 2, 3).unwrap())
        );
        assert_eq!(first.pain_score, Reading::Valid(3.5));
        assert_eq!(first.risk_factor, Reading::Valid(false));
        assert_eq!(first.outcome_matches_expected, Reading::Valid(true));
        assert_eq!(visits[1].age, Reading::Missing);

        let third = &visits[2];
        assert_eq!(third.contact_date, ContactDate::Invalid("not a date".into()));
        assert_eq!(third.function_status, None);
        assert_eq!(third.risk_factor.valid(), Some(true));
        assert_eq!(visits.visits_for_patient(7).count(), 2);
    }

    #[test]
    fn keeps_unparseable_values() {
        let csv = format!(
            "{}{}{}",
            HEADER,
            "1,2021-01-01,2,2,unbekannt,3,ca. 40,w,ja,2\n",
            "2,2021-01-01,2,2,4,3,40,m,1,0\n",
        );
        let visits = Visits::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(visits.len(), 2);
        let first = &visits[0];
        assert_eq!(first.function_score, Reading::Invalid("unbekannt".into()));
        assert_eq!(first.function_score.valid(), None);
        assert_eq!(first.age.invalid().map(|s| &**s), Some("ca. 40"));
        assert_eq!(first.risk_factor, Reading::Invalid("ja".into()));
        assert_eq!(first.outcome_matches_expected, Reading::Invalid("2".into()));
        assert_eq!(first.pain_score, Reading::Valid(3.));
        assert_eq!(visits[1].function_score.valid(), Some(4.));
    }

    #[test]
    fn rejects_non_numeric_identifier() {
        let csv = format!("{}abc,2021-01-01,2,2,1,1,30,m,0,1\n", HEADER);
        assert!(Visits::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn status_labels_and_codes() {
        assert_eq!("verbessert".parse::<Status>().unwrap(), Status::Improved);
        assert_eq!("Unverändert".parse::<Status>().unwrap(), Status::Unchanged);
        assert_eq!("0".parse::<Status>().unwrap(), Status::Worse);
        assert_eq!("2.0".parse::<Status>().unwrap(), Status::Improved);
        assert!("3".parse::<Status>().is_err());
        assert!("1.5".parse::<Status>().is_err());
        assert!("besser".parse::<Status>().is_err());
    }

    #[test]
    fn sex_labels() {
        assert_eq!("w".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!("M".parse::<Sex>().unwrap(), Sex::Male);
        assert!("x".parse::<Sex>().is_err());
    }
}
