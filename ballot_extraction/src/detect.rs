//! Symbol location: turning a rectified image (or a single row) into
//! labeled candidate-name regions and mark detections.
//!
//! Two interchangeable strategies exist behind one interface: template
//! matching against a fixed mark library, and an external learned detector
//! consumed as a capability that returns labeled boxes.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use log::debug;

use crate::config::{
    normalize_name, BoundingBox, CandidateRegion, ExtractionErrors, Mark, SymbolKind,
};

/// A raw labeled detection as produced by a detection capability. Labels
/// are drawn from the mark symbol names plus the candidate roster.
#[derive(PartialEq, Debug, Clone)]
pub struct Detection {
    pub label: String,
    pub bounds: BoundingBox,
    pub confidence: f32,
}

/// The detection capability consumed by the pipeline. Implementations run
/// once over the whole rectified image and return every name and mark box
/// above their own confidence cutoff.
pub trait SymbolDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ExtractionErrors>;
}

/// A detector backed by pre-computed boxes, e.g. read from the output file
/// of an external inference run. The image argument is ignored.
#[derive(PartialEq, Debug, Clone)]
pub struct StaticDetections {
    pub detections: Vec<Detection>,
}

impl SymbolDetector for StaticDetections {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, ExtractionErrors> {
        Ok(self.detections.clone())
    }
}

/// Detections split by kind, the shared output shape both strategies feed
/// to the position associator.
#[derive(PartialEq, Debug, Clone)]
pub struct SplitDetections {
    pub candidates: Vec<CandidateRegion>,
    pub marks: Vec<Mark>,
}

/// Splits raw detections into candidate-name regions and mark detections,
/// preserving enumeration order within each group.
///
/// A label that is neither a mark symbol nor a roster name becomes an
/// `Unknown` mark; the validity rules reject it later, which keeps a
/// confused detector from ever producing a false valid ballot.
pub fn split_detections(
    detections: &[Detection],
    roster: &[String],
) -> Result<SplitDetections, ExtractionErrors> {
    let normalized_roster: Vec<String> = roster.iter().map(|n| normalize_name(n)).collect();

    let mut candidates = Vec::new();
    let mut marks = Vec::new();
    for d in detections.iter() {
        // Re-validate the box: a detector handing out non-positive
        // dimensions is a contract fault and fails the whole ballot.
        let bounds = BoundingBox::new(d.bounds.x1, d.bounds.y1, d.bounds.x2, d.bounds.y2)?;
        if let Some(kind) = SymbolKind::from_label(&d.label) {
            marks.push(Mark {
                kind,
                confidence: d.confidence.clamp(0.0, 1.0),
                bounds,
            });
        } else if let Some(idx) = normalized_roster
            .iter()
            .position(|n| *n == normalize_name(&d.label))
        {
            candidates.push(CandidateRegion {
                candidate_name: roster[idx].clone(),
                bounds,
            });
        } else {
            debug!("split_detections: unknown label {:?}", d.label);
            marks.push(Mark {
                kind: SymbolKind::Unknown,
                confidence: d.confidence.clamp(0.0, 1.0),
                bounds,
            });
        }
    }
    Ok(SplitDetections { candidates, marks })
}

/// A fixed library of grayscale mark templates, loaded once per process and
/// shared read-only across ballot workers.
pub struct TemplateLibrary {
    templates: Vec<(SymbolKind, GrayImage)>,
    threshold: f32,
}

impl TemplateLibrary {
    pub fn new(
        templates: Vec<(SymbolKind, GrayImage)>,
        threshold: f32,
    ) -> Result<TemplateLibrary, ExtractionErrors> {
        if templates.is_empty() {
            return Err(ExtractionErrors::EmptyTemplateLibrary);
        }
        Ok(TemplateLibrary {
            templates,
            threshold,
        })
    }

    /// Finds the best-matching mark in one row sub-image by normalized
    /// cross-correlation.
    ///
    /// Marks are dark ink on white paper, so both sides are inverted before
    /// matching; blank paper then correlates to zero instead of to the
    /// templates' white background. Templates larger than the row are
    /// downscaled proportionally first. Returns `None` when no template
    /// scores above the acceptance threshold; the caller records the row as
    /// unmarked.
    pub fn best_match(&self, row: &RgbImage) -> Option<Mark> {
        let mut gray = imageops::grayscale(row);
        imageops::invert(&mut gray);
        let (rw, rh) = gray.dimensions();

        let mut best: Option<Mark> = None;
        for (kind, original) in self.templates.iter() {
            let mut template = if original.width() > rw || original.height() > rh {
                let scale = (rw as f32 / original.width() as f32)
                    .min(rh as f32 / original.height() as f32);
                let tw = ((original.width() as f32 * scale) as u32).max(1);
                let th = ((original.height() as f32 * scale) as u32).max(1);
                imageops::resize(original, tw, th, FilterType::Triangle)
            } else {
                original.clone()
            };
            if template.width() > rw || template.height() > rh {
                continue;
            }
            imageops::invert(&mut template);

            let scores = match_template(
                &gray,
                &template,
                MatchTemplateMethod::CrossCorrelationNormalized,
            );
            let mut max_score = f32::MIN;
            let mut max_loc = (0u32, 0u32);
            for (x, y, p) in scores.enumerate_pixels() {
                if p[0] > max_score {
                    max_score = p[0];
                    max_loc = (x, y);
                }
            }

            let beats_best = match best {
                Some(ref m) => max_score > m.confidence,
                None => true,
            };
            if beats_best && max_score > self.threshold {
                best = Some(Mark {
                    kind: *kind,
                    confidence: max_score.clamp(0.0, 1.0),
                    bounds: BoundingBox {
                        x1: max_loc.0,
                        y1: max_loc.1,
                        x2: max_loc.0 + template.width(),
                        y2: max_loc.1 + template.height(),
                    },
                });
            }
        }
        if best.is_none() {
            debug!("best_match: no template above threshold, row is unmarked");
        }
        best
    }
}
