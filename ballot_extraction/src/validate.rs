//! Vote validity rules for preferential ballots: a ballot carries either a
//! single cross (one first preference) or the numbers 1, 2 and 3 each
//! exactly once.

use log::debug;

use crate::config::{AssociationRecord, Ballot, RejectionReason, SymbolKind};

/// The verdict over one ballot's association records.
#[derive(PartialEq, Debug, Clone)]
pub enum BallotDecision {
    /// A single cross: one first preference, no lower preferences.
    AcceptedCross { first: String },
    /// A full 1/2/3 numbering.
    AcceptedNumbered {
        first: String,
        second: String,
        third: String,
    },
    Rejected(RejectionReason),
}

/// Applies the validity rules to the association records, in order:
/// a ballot with no marks at all is empty; any mark outside the known
/// symbol set invalidates it; a cross must be the only mark present;
/// otherwise the numeric marks must form exactly the set {1, 2, 3}.
///
/// Marked rows are considered in sheet order, so the decision never
/// depends on detection order.
pub fn decide(records: &[AssociationRecord]) -> BallotDecision {
    let marked: Vec<(&AssociationRecord, SymbolKind)> = records
        .iter()
        .filter_map(|r| r.mark.as_ref().map(|m| (r, m.kind)))
        .collect();

    if marked.is_empty() {
        return BallotDecision::Rejected(RejectionReason::EmptyBallot);
    }
    if marked.iter().any(|(_, k)| *k == SymbolKind::Unknown) {
        return BallotDecision::Rejected(RejectionReason::InvalidSymbol);
    }

    let crosses: Vec<&&AssociationRecord> = marked
        .iter()
        .filter(|(_, k)| *k == SymbolKind::Cross)
        .map(|(r, _)| r)
        .collect();
    if !crosses.is_empty() {
        if crosses.len() > 1 || marked.len() > 1 {
            debug!(
                "decide: {} crosses among {} marks, rejecting",
                crosses.len(),
                marked.len()
            );
            return BallotDecision::Rejected(RejectionReason::ConflictingCross);
        }
        return BallotDecision::AcceptedCross {
            first: crosses[0].candidate_name.clone(),
        };
    }

    // Only numeric marks remain. They must be exactly {1, 2, 3}, each once.
    let mut first = None;
    let mut second = None;
    let mut third = None;
    for (record, kind) in marked.iter() {
        let slot = match kind {
            SymbolKind::One => &mut first,
            SymbolKind::Two => &mut second,
            SymbolKind::Three => &mut third,
            _ => unreachable!("non-numeric marks are filtered above"),
        };
        if slot.is_some() {
            return BallotDecision::Rejected(RejectionReason::IncompleteNumbering);
        }
        *slot = Some(record.candidate_name.clone());
    }
    match (first, second, third) {
        (Some(first), Some(second), Some(third)) => BallotDecision::AcceptedNumbered {
            first,
            second,
            third,
        },
        _ => BallotDecision::Rejected(RejectionReason::IncompleteNumbering),
    }
}

/// Assembles the final ballot value from the records and their verdict.
pub fn assemble(records: Vec<AssociationRecord>) -> Ballot {
    match decide(&records) {
        BallotDecision::AcceptedCross { first } => Ballot {
            records,
            is_valid: true,
            first_preference: Some(first),
            second_preference: None,
            third_preference: None,
            rejection: None,
        },
        BallotDecision::AcceptedNumbered {
            first,
            second,
            third,
        } => Ballot {
            records,
            is_valid: true,
            first_preference: Some(first),
            second_preference: Some(second),
            third_preference: Some(third),
            rejection: None,
        },
        BallotDecision::Rejected(reason) => Ballot {
            records,
            is_valid: false,
            first_preference: None,
            second_preference: None,
            third_preference: None,
            rejection: Some(reason),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundingBox, Mark};

    fn record(position: u32, name: &str, kind: Option<SymbolKind>) -> AssociationRecord {
        AssociationRecord {
            sheet_position: position,
            candidate_name: name.to_string(),
            mark: kind.map(|kind| Mark {
                kind,
                confidence: 0.9,
                bounds: BoundingBox {
                    x1: 400,
                    y1: position * 60,
                    x2: 430,
                    y2: position * 60 + 30,
                },
            }),
        }
    }

    #[test]
    fn single_cross_is_valid() {
        let records = vec![
            record(1, "Pamudu Ranasinghe", None),
            record(2, "Kasun Jayawardena", Some(SymbolKind::Cross)),
            record(3, "Tharindu Fernando", None),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::AcceptedCross {
                first: "Kasun Jayawardena".to_string()
            }
        );
        let ballot = assemble(records);
        assert!(ballot.is_valid);
        assert_eq!(
            ballot.first_preference,
            Some("Kasun Jayawardena".to_string())
        );
        assert_eq!(ballot.second_preference, None);
    }

    #[test]
    fn full_numbering_is_valid() {
        let records = vec![
            record(1, "A", Some(SymbolKind::Two)),
            record(2, "B", None),
            record(3, "C", Some(SymbolKind::One)),
            record(4, "D", Some(SymbolKind::Three)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::AcceptedNumbered {
                first: "C".to_string(),
                second: "A".to_string(),
                third: "D".to_string(),
            }
        );
    }

    #[test]
    fn empty_ballot_is_rejected() {
        let records = vec![record(1, "A", None), record(2, "B", None)];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::EmptyBallot)
        );
        let ballot = assemble(records);
        assert!(!ballot.is_valid);
        assert_eq!(ballot.rejection, Some(RejectionReason::EmptyBallot));
        assert_eq!(ballot.first_preference, None);
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let records = vec![
            record(1, "A", Some(SymbolKind::One)),
            record(2, "B", Some(SymbolKind::Unknown)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::InvalidSymbol)
        );
    }

    #[test]
    fn two_crosses_are_rejected() {
        let records = vec![
            record(1, "A", Some(SymbolKind::Cross)),
            record(2, "B", Some(SymbolKind::Cross)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::ConflictingCross)
        );
    }

    #[test]
    fn cross_mixed_with_number_is_rejected() {
        let records = vec![
            record(1, "A", Some(SymbolKind::Cross)),
            record(2, "B", Some(SymbolKind::One)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::ConflictingCross)
        );
    }

    #[test]
    fn partial_numbering_is_rejected() {
        let records = vec![
            record(1, "A", Some(SymbolKind::One)),
            record(2, "B", Some(SymbolKind::Two)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::IncompleteNumbering)
        );
    }

    #[test]
    fn duplicated_number_is_rejected() {
        let records = vec![
            record(1, "A", Some(SymbolKind::One)),
            record(2, "B", Some(SymbolKind::One)),
            record(3, "C", Some(SymbolKind::Two)),
        ];
        assert_eq!(
            decide(&records),
            BallotDecision::Rejected(RejectionReason::IncompleteNumbering)
        );
    }

    #[test]
    fn order_of_records_does_not_change_verdict() {
        let mut records = vec![
            record(1, "A", Some(SymbolKind::Three)),
            record(2, "B", Some(SymbolKind::One)),
            record(3, "C", Some(SymbolKind::Two)),
        ];
        let forward = decide(&records);
        records.reverse();
        let backward = decide(&records);
        assert_eq!(forward, backward);
    }
}
