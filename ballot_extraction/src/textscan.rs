//! Fallback extraction from a layout-preserving OCR transcript of the
//! ballot, for inputs where no usable photograph exists.
//!
//! The transcript is expected in line-printer form: one text line per
//! printed row, columns roughly aligned. Candidate rows are recognized by
//! roster-name containment and the vote character is read from the columns
//! to the right of the name area.

use log::debug;

use crate::config::{normalize_name, AssociationRecord, BoundingBox, Mark, SymbolKind};

/// Column at which the candidate-name area of a row ends; vote characters
/// are only looked for beyond it.
pub const NAME_END_COLUMN: usize = 20;

/// Parses a transcript into association records, one per line containing a
/// roster name, in transcript order.
///
/// The vote character is searched on the candidate's own line first, then
/// the line above, then the line below; printed checkbox artifacts (`[X]`)
/// are ignored. Mark positions are synthesized in character-cell units:
/// the column index as x, the line index as y.
pub fn parse_transcript(text: &str, roster: &[String]) -> Vec<AssociationRecord> {
    let normalized_roster: Vec<String> = roster.iter().map(|n| normalize_name(n)).collect();
    let lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();

    let mut records = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let normalized_line = normalize_name(line);
        let matched = normalized_roster
            .iter()
            .position(|n| normalized_line.contains(n.as_str()));
        let idx = match matched {
            Some(idx) => idx,
            None => continue,
        };

        let mut mark = extract_vote(line, i);
        if mark.is_none() && i > 0 {
            mark = extract_vote(lines[i - 1], i - 1);
        }
        if mark.is_none() && i + 1 < lines.len() {
            mark = extract_vote(lines[i + 1], i + 1);
        }
        if mark.is_none() {
            debug!(
                "parse_transcript: no vote character near {:?} (line {})",
                roster[idx], i
            );
        }

        records.push(AssociationRecord {
            sheet_position: (records.len() + 1) as u32,
            candidate_name: roster[idx].clone(),
            mark,
        });
    }
    records
}

/// Scans the vote columns of one line for the first vote character.
///
/// The synthesized bounds cover the character's cell, so downstream code
/// can treat transcript marks like image marks.
fn extract_vote(line: &str, line_index: usize) -> Option<Mark> {
    let tail: String = line.chars().skip(NAME_END_COLUMN).collect();
    // Pre-printed empty checkboxes render as "[X]"; only a bare character
    // counts as a voter mark.
    let cleaned = tail.replace("[X]", "   ");
    for (offset, c) in cleaned.chars().enumerate() {
        let kind = match c {
            'X' | 'x' => SymbolKind::Cross,
            '1' => SymbolKind::One,
            '2' => SymbolKind::Two,
            '3' => SymbolKind::Three,
            _ => continue,
        };
        let col = (NAME_END_COLUMN + offset) as u32;
        let row = line_index as u32;
        return Some(Mark {
            kind,
            confidence: 1.0,
            bounds: BoundingBox {
                x1: col,
                y1: row,
                x2: col + 1,
                y2: row + 1,
            },
        });
    }
    None
}
