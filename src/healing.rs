//! Healing trajectory classification.
use crate::Status;
use serde::Serialize;
use std::fmt;

/// Healing trajectory of a patient over their whole course of treatment.
///
/// Groups are ordered by severity, and the discriminant is the group id used in reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum HealingGroup {
    /// Every recorded status was an improvement.
    NoStagnation = 1,
    /// At least one contact without change, but never a deterioration.
    Stagnation = 2,
    /// At least one deterioration.
    Worsening = 3,
}

impl HealingGroup {
    pub const ALL: [HealingGroup; 3] = [
        HealingGroup::NoStagnation,
        HealingGroup::Stagnation,
        HealingGroup::Worsening,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            HealingGroup::NoStagnation => "No stagnation",
            HealingGroup::Stagnation => "Stagnation",
            HealingGroup::Worsening => "Worsening",
        }
    }
}

impl fmt::Display for HealingGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.id())
    }
}

/// Classify a status history, worst status wins.
///
/// The order of `statuses` does not matter.
///
/// # Panics
///
/// Panics if `statuses` is empty. Patients without any status are excluded during aggregation
/// and never reach classification.
pub fn classify(statuses: &[Status]) -> HealingGroup {
    assert!(
        !statuses.is_empty(),
        "cannot classify a patient without status observations"
    );
    if statuses.contains(&Status::Worse) {
        HealingGroup::Worsening
    } else if statuses.contains(&Status::Unchanged) {
        HealingGroup::Stagnation
    } else {
        HealingGroup::NoStagnation
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    fn statuses(codes: &[u8]) -> Vec<Status> {
        codes
            .iter()
            .map(|code| Status::try_from(*code).unwrap())
            .collect()
    }

    #[test]
    fn worst_status_wins() {
        assert_eq!(classify(&statuses(&[2, 2, 2])), HealingGroup::NoStagnation);
        assert_eq!(classify(&statuses(&[2, 1, 2])), HealingGroup::Stagnation);
        assert_eq!(classify(&statuses(&[2, 1, 0])), HealingGroup::Worsening);
        assert_eq!(classify(&statuses(&[0])), HealingGroup::Worsening);
        assert_eq!(classify(&statuses(&[1])), HealingGroup::Stagnation);
    }

    #[test]
    fn order_does_not_matter() {
        let history = statuses(&[2, 1, 2, 0, 1]);
        for perm in history.iter().copied().permutations(history.len()) {
            assert_eq!(classify(&perm), HealingGroup::Worsening);
        }
        let history = statuses(&[2, 2, 1]);
        for perm in history.iter().copied().permutations(history.len()) {
            assert_eq!(classify(&perm), HealingGroup::Stagnation);
        }
    }

    #[test]
    #[should_panic]
    fn empty_history_is_a_bug() {
        classify(&[]);
    }

    #[test]
    fn ids_and_ordering() {
        assert_eq!(
            HealingGroup::ALL.iter().map(|g| g.id()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(HealingGroup::NoStagnation < HealingGroup::Worsening);
    }
}
