//! Append-only record of every patient or row that was skipped or flagged, and why.
use crate::PatientId;
use qu::ick_use::*;
use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use term_data_table as tdt;

/// What a ledger entry is about.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum Entity {
    Patient(PatientId),
    /// A source row that could not be attributed to a patient.
    Row(usize),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Entity::Patient(id) => write!(f, "{}", id),
            Entity::Row(idx) => write!(f, "Row_{}", idx),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum IssueKind {
    InvalidIdentifier,
    NoStatusData,
    InvalidStatus,
    InvalidContactDate,
    InvalidSex,
    InvalidValue,
    InconsistentSex,
    InconsistentRiskFactor,
    MissingAge,
    AgeOutOfRange,
    MissingValue,
}

impl IssueKind {
    pub fn code(self) -> &'static str {
        match self {
            IssueKind::InvalidIdentifier => "Invalid_Identifier",
            IssueKind::NoStatusData => "No_Status_Data",
            IssueKind::InvalidStatus => "Invalid_Status",
            IssueKind::InvalidContactDate => "Invalid_Contact_Date",
            IssueKind::InvalidSex => "Invalid_Sex",
            IssueKind::InvalidValue => "Invalid_Value",
            IssueKind::InconsistentSex => "Inconsistent_Sex",
            IssueKind::InconsistentRiskFactor => "Inconsistent_Risk_Factor",
            IssueKind::MissingAge => "Missing_Age",
            IssueKind::AgeOutOfRange => "Age_Out_Of_Range",
            IssueKind::MissingValue => "Missing_Value",
        }
    }

    /// Whether an issue of this kind removes the entity from the analysis that recorded it.
    ///
    /// The others are data-quality flags: the entity stays in.
    pub fn excludes(self) -> bool {
        !matches!(
            self,
            IssueKind::InvalidStatus
                | IssueKind::InvalidContactDate
                | IssueKind::InvalidSex
                | IssueKind::InvalidValue
                | IssueKind::InconsistentSex
                | IssueKind::InconsistentRiskFactor
        )
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub entity: Entity,
    pub issue: IssueKind,
    /// The offending value, if there was one.
    pub value: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionLedger {
    entries: Vec<LedgerEntry>,
}

impl ExclusionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        entity: Entity,
        issue: IssueKind,
        value: Option<&dyn fmt::Display>,
        reason: impl Into<String>,
    ) {
        let entry = LedgerEntry {
            entity,
            issue,
            value: value.map(|v| v.to_string()),
            reason: reason.into(),
        };
        event!(
            Level::DEBUG,
            "{} {}: {} ({})",
            entry.issue,
            entry.entity,
            entry.reason,
            entry.value.as_deref().unwrap_or("")
        );
        self.entries.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with the given issue.
    pub fn count(&self, issue: IssueKind) -> usize {
        self.entries.iter().filter(|e| e.issue == issue).count()
    }

    /// Entry counts for every issue that occurs.
    pub fn counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.issue).or_insert(0) += 1;
        }
        counts
    }

    /// Whether the entity has an entry that excludes it.
    pub fn is_excluded(&self, entity: Entity) -> bool {
        self.entries
            .iter()
            .any(|e| e.entity == entity && e.issue.excludes())
    }

    /// Number of distinct entities removed by an excluding entry.
    pub fn excluded_count(&self) -> usize {
        let mut entities = self
            .entries
            .iter()
            .filter(|e| e.issue.excludes())
            .map(|e| e.entity)
            .collect::<Vec<_>>();
        entities.sort_unstable();
        entities.dedup();
        entities.len()
    }

    /// Write a summary line for every issue kind present.
    pub fn log_summary(&self, context: &str) {
        for (issue, count) in self.counts() {
            event!(Level::WARN, "{}: {} x {}", context, count, issue);
        }
    }

    pub fn summary_table(&self) -> tdt::Table {
        let mut table = tdt::Table::new().with_row(
            tdt::Row::new()
                .with_cell(tdt::Cell::from("Issue"))
                .with_cell(tdt::Cell::from("Count"))
                .with_cell(tdt::Cell::from("Excludes")),
        );
        for (issue, count) in self.counts() {
            table.add_row(
                tdt::Row::new()
                    .with_cell(tdt::Cell::from(issue.code()))
                    .with_cell(tdt::Cell::from(count.to_string()))
                    .with_cell(tdt::Cell::from(if issue.excludes() { "yes" } else { "no" })),
            );
        }
        table
    }

    pub fn term_table(&self) -> tdt::Table {
        let mut table = tdt::Table::new().with_row(
            tdt::Row::new()
                .with_cell(tdt::Cell::from("Entity"))
                .with_cell(tdt::Cell::from("Issue"))
                .with_cell(tdt::Cell::from("Value"))
                .with_cell(tdt::Cell::from("Reason")),
        );
        for entry in &self.entries {
            table.add_row(
                tdt::Row::new()
                    .with_cell(tdt::Cell::from(entry.entity.to_string()))
                    .with_cell(tdt::Cell::from(entry.issue.code()))
                    .with_cell(tdt::Cell::from(entry.value.clone().unwrap_or_default()))
                    .with_cell(tdt::Cell::from(entry.reason.clone())),
            );
        }
        table
    }
}

impl<'a> IntoIterator for &'a ExclusionLedger {
    type IntoIter = std::slice::Iter<'a, LedgerEntry>;
    type Item = &'a LedgerEntry;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entity_display() {
        assert_eq!(Entity::Row(4).to_string(), "Row_4");
        assert_eq!(Entity::Patient(12).to_string(), "12");
    }

    #[test]
    fn excluded_count_is_per_entity() {
        let mut ledger = ExclusionLedger::new();
        ledger.record(Entity::Patient(1), IssueKind::MissingAge, None, "Age is missing");
        ledger.record(
            Entity::Patient(1),
            IssueKind::MissingValue,
            None,
            "Outcome is missing",
        );
        ledger.record(
            Entity::Patient(2),
            IssueKind::InvalidSex,
            Some(&"x"),
            "unrecognised sex",
        );
        ledger.record(Entity::Row(0), IssueKind::InvalidIdentifier, None, "Null Unique ID");

        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.excluded_count(), 2);
        assert!(ledger.is_excluded(Entity::Patient(1)));
        assert!(!ledger.is_excluded(Entity::Patient(2)));
        assert_eq!(ledger.count(IssueKind::MissingAge), 1);
        assert_eq!(ledger.counts().len(), 4);
        assert_eq!(ledger.iter().nth(2).unwrap().value.as_deref(), Some("x"));
    }
}
