//! Pairs each candidate-name region with the mark (if any) drawn next to
//! it, by vertical proximity on the rectified image.

use log::debug;

use crate::config::{AssociationRecord, CandidateRegion, Mark};

/// Associates marks to candidates by vertical position.
///
/// Candidates are taken in sheet order (the slice order is the sheet
/// order); for each one, marks are scanned in enumeration order and the
/// first mark satisfying any proximity rule wins. The rules, in order:
/// the mark's top edge lies inside the candidate's vertical span, the
/// candidate's span contains the mark's whole span, or the mark sits
/// within `tolerance` pixels above or below the candidate region.
///
/// A mark may associate with more than one candidate; the validity rules
/// downstream reject such ballots on their own terms.
pub fn associate(
    candidates: &[CandidateRegion],
    marks: &[Mark],
    tolerance: u32,
) -> Vec<AssociationRecord> {
    let mut records = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        let found = marks.iter().find(|m| is_adjacent(candidate, m, tolerance));
        if found.is_none() {
            debug!(
                "associate: no mark near candidate {:?} (position {})",
                candidate.candidate_name,
                idx + 1
            );
        }
        records.push(AssociationRecord {
            sheet_position: (idx + 1) as u32,
            candidate_name: candidate.candidate_name.clone(),
            mark: found.cloned(),
        });
    }
    records
}

fn is_adjacent(candidate: &CandidateRegion, mark: &Mark, tolerance: u32) -> bool {
    let c = &candidate.bounds;
    let m = &mark.bounds;
    // Mark's top edge inside the candidate's vertical span.
    if m.y1 >= c.y1 && m.y1 <= c.y2 {
        return true;
    }
    // Candidate's span contains the whole mark.
    if m.y1 >= c.y1 && m.y2 <= c.y2 {
        return true;
    }
    // Mark just above the candidate region.
    if c.y1.abs_diff(m.y2) <= tolerance {
        return true;
    }
    // Mark just below.
    if m.y1.abs_diff(c.y2) <= tolerance {
        return true;
    }
    false
}
