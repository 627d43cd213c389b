//! Extraction of preferential votes from photographed ballot papers.
//!
//! A ballot photograph goes through a pipeline of pure transformations:
//! perspective rectification, row segmentation, symbol location, position
//! association, and finally the vote validity rules. Each stage is a
//! stateless function over the data model in [`config`]; the only
//! pluggable part is the mark-detection strategy, either per-row template
//! matching or an external whole-image detector.
//!
//! The main entry points are [`extract_ballot`] for images,
//! [`extract_from_detections`] for pre-computed detector output, and
//! [`extract_from_transcript`] for layout-preserving OCR text.

mod associate;
mod config;
mod detect;
mod rectify;
mod segment;
mod textscan;
mod validate;

pub use crate::associate::associate;
pub use crate::config::*;
pub use crate::detect::{
    split_detections, Detection, SplitDetections, StaticDetections, SymbolDetector,
    TemplateLibrary,
};
pub use crate::rectify::{rectify, RectifiedBallot};
pub use crate::segment::{segment_rows, RowSlice};
pub use crate::textscan::parse_transcript;
pub use crate::validate::{assemble, decide, BallotDecision};

use image::RgbImage;
use log::{info, warn};

/// Per-election context shared by every ballot of a batch.
#[derive(PartialEq, Debug, Clone)]
pub struct ExtractionContext {
    /// The candidate roster in printed sheet order.
    pub candidates: Vec<String>,
    pub options: ExtractionOptions,
}

/// The mark-detection strategy used for a batch.
pub enum MarkSource<'a> {
    /// Per-row template matching against a fixed mark library.
    Templates(&'a TemplateLibrary),
    /// An external detection capability run once over the rectified image.
    Detector(&'a dyn SymbolDetector),
}

/// Processes one ballot photograph end to end and returns the judged
/// ballot.
///
/// Only rectification failure and malformed detector output abort a
/// ballot; every in-pipeline anomaly (unmarked row, row-count mismatch)
/// resolves to a sentinel and flows into the validity rules instead.
pub fn extract_ballot(
    image: &RgbImage,
    source: &MarkSource,
    ctx: &ExtractionContext,
) -> Result<Ballot, ExtractionErrors> {
    let rectified = rectify(image, &ctx.options)?;
    match source {
        MarkSource::Templates(library) => {
            let rows = segment_rows(&rectified.binary, &rectified.color, &ctx.options);
            if rows.len() != ctx.candidates.len() {
                warn!(
                    "segmentation anomaly: {} rows for {} candidates, continuing",
                    rows.len(),
                    ctx.candidates.len()
                );
            }
            let mut records = Vec::with_capacity(ctx.candidates.len());
            for (idx, row) in rows.iter().enumerate() {
                let name = match ctx.candidates.get(idx) {
                    Some(name) => name,
                    None => {
                        warn!(
                            "dropping extra row at y {}..{}",
                            row.bounds.y1, row.bounds.y2
                        );
                        continue;
                    }
                };
                let region = CandidateRegion {
                    candidate_name: name.clone(),
                    bounds: row.bounds,
                };
                let marks: Vec<Mark> = library
                    .best_match(&row.image)
                    .map(|m| into_canonical_frame(m, &row.bounds))
                    .into_iter()
                    .collect();
                let mut row_records =
                    associate(&[region], &marks, ctx.options.row_mark_tolerance);
                if let Some(mut record) = row_records.pop() {
                    record.sheet_position = (idx + 1) as u32;
                    records.push(record);
                }
            }
            let ballot = assemble(records);
            info!(
                "template extraction done: valid={} first={:?}",
                ballot.is_valid, ballot.first_preference
            );
            Ok(ballot)
        }
        MarkSource::Detector(detector) => {
            let detections = detector.detect(&rectified.color)?;
            extract_from_detections(&detections, ctx)
        }
    }
}

/// Judges a ballot from pre-computed labeled detections, the shared path
/// behind the whole-image detector strategy.
pub fn extract_from_detections(
    detections: &[Detection],
    ctx: &ExtractionContext,
) -> Result<Ballot, ExtractionErrors> {
    let mut split = split_detections(detections, &ctx.candidates)?;
    if split.candidates.len() != ctx.candidates.len() {
        warn!(
            "detection anomaly: {} name regions for {} candidates, continuing",
            split.candidates.len(),
            ctx.candidates.len()
        );
    }
    // Sheet order is the printed top-to-bottom order, not the order the
    // detector happened to emit the boxes in.
    split.candidates.sort_by_key(|c| c.bounds.y1);
    let records = associate(&split.candidates, &split.marks, ctx.options.mark_tolerance);
    let ballot = assemble(records);
    info!(
        "detector extraction done: valid={} first={:?}",
        ballot.is_valid, ballot.first_preference
    );
    Ok(ballot)
}

/// Judges a ballot from a line-printer OCR transcript.
pub fn extract_from_transcript(text: &str, ctx: &ExtractionContext) -> Ballot {
    let ballot = assemble(parse_transcript(text, &ctx.candidates));
    info!(
        "transcript extraction done: valid={} first={:?}",
        ballot.is_valid, ballot.first_preference
    );
    ballot
}

/// Translates a mark located in row-local coordinates into the canonical
/// frame of the whole rectified image.
fn into_canonical_frame(mark: Mark, row: &BoundingBox) -> Mark {
    Mark {
        bounds: BoundingBox {
            x1: mark.bounds.x1 + row.x1,
            y1: mark.bounds.y1 + row.y1,
            x2: mark.bounds.x2 + row.x1,
            y2: mark.bounds.y2 + row.y1,
        },
        ..mark
    }
}
