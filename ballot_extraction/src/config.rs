// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A detection rectangle in pixel coordinates of the rectified image.
///
/// Invariant: `x2 > x1` and `y2 > y1`. Boxes that violate this come from a
/// misbehaving detection capability and are treated as contract faults.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<BoundingBox, ExtractionErrors> {
        if x2 <= x1 || y2 <= y1 {
            return Err(ExtractionErrors::MalformedBoundingBox { x1, y1, x2, y2 });
        }
        Ok(BoundingBox { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// The kind of mark a voter can leave next to a candidate name.
///
/// `Unknown` is reserved for detections whose label falls outside the known
/// set. It is carried through the pipeline and rejected by the validity
/// rules, never silently dropped.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum SymbolKind {
    Cross,
    One,
    Two,
    Three,
    Unknown,
}

impl SymbolKind {
    /// Parses a detection class label. Labels are matched case-insensitively.
    pub fn from_label(label: &str) -> Option<SymbolKind> {
        match label.trim().to_ascii_lowercase().as_str() {
            "cross" | "x" => Some(SymbolKind::Cross),
            "1" | "one" => Some(SymbolKind::One),
            "2" | "two" => Some(SymbolKind::Two),
            "3" | "three" => Some(SymbolKind::Three),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SymbolKind::One | SymbolKind::Two | SymbolKind::Three)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Cross => "cross",
            SymbolKind::One => "1",
            SymbolKind::Two => "2",
            SymbolKind::Three => "3",
            SymbolKind::Unknown => "unknown",
        }
    }
}

/// A located, classified mark: what was drawn, how confident the detection
/// is, and where it sits on the rectified image.
#[derive(PartialEq, Debug, Clone)]
pub struct Mark {
    pub kind: SymbolKind,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bounds: BoundingBox,
}

/// The printed location of one candidate name on the rectified image.
///
/// `candidate_name` is always drawn from the closed roster configured for
/// the election; there is no free-text recognition anywhere in the pipeline.
#[derive(PartialEq, Debug, Clone)]
pub struct CandidateRegion {
    pub candidate_name: String,
    pub bounds: BoundingBox,
}

// ******** Output data structures *********

/// One row of the ballot after association: a candidate and the mark (if
/// any) found next to it. Immutable once produced.
#[derive(PartialEq, Debug, Clone)]
pub struct AssociationRecord {
    /// 1-based row index in ballot order.
    pub sheet_position: u32,
    pub candidate_name: String,
    pub mark: Option<Mark>,
}

/// Why a ballot was rejected.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RejectionReason {
    /// No mark was extracted for any candidate.
    EmptyBallot,
    /// A mark outside the cross/1/2/3 set was extracted.
    InvalidSymbol,
    /// More than one cross, or a cross mixed with other marks.
    ConflictingCross,
    /// Numeric marks do not form exactly the set {1, 2, 3}.
    IncompleteNumbering,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::EmptyBallot => "empty ballot",
            RejectionReason::InvalidSymbol => "invalid symbol",
            RejectionReason::ConflictingCross => "cross mixed with other marks",
            RejectionReason::IncompleteNumbering => "incomplete or duplicated numbering",
        }
    }
}

/// The fully processed ballot paper: the ordered association records plus
/// the validity verdict and derived preferences.
///
/// A `Ballot` is created once per input image and handed to downstream
/// consumers as an immutable value.
#[derive(PartialEq, Debug, Clone)]
pub struct Ballot {
    pub records: Vec<AssociationRecord>,
    pub is_valid: bool,
    pub first_preference: Option<String>,
    pub second_preference: Option<String>,
    pub third_preference: Option<String>,
    /// `None` when the ballot is valid.
    pub rejection: Option<RejectionReason>,
}

/// Errors that abort the processing of a single ballot image.
///
/// Component-local anomalies (low template confidence, row-count mismatch)
/// never surface here; they resolve to sentinel values inside the pipeline.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ExtractionErrors {
    /// No contour was found around the ballot paper. Fatal for this image.
    NoBallotBoundary,
    /// A boundary was found but spans a degenerate rectangle.
    DegenerateBoundary,
    /// A detection capability returned a box with non-positive dimensions.
    MalformedBoundingBox { x1: u32, y1: u32, x2: u32, y2: u32 },
    /// The template library was constructed without any templates.
    EmptyTemplateLibrary,
    /// The external detection capability failed outright.
    DetectorFailure(String),
}

impl Error for ExtractionErrors {}

impl Display for ExtractionErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionErrors::NoBallotBoundary => {
                write!(f, "no ballot boundary found in image")
            }
            ExtractionErrors::DegenerateBoundary => {
                write!(f, "ballot boundary is degenerate")
            }
            ExtractionErrors::MalformedBoundingBox { x1, y1, x2, y2 } => {
                write!(
                    f,
                    "detector returned a malformed box ({}, {}, {}, {})",
                    x1, y1, x2, y2
                )
            }
            ExtractionErrors::EmptyTemplateLibrary => {
                write!(f, "template library contains no templates")
            }
            ExtractionErrors::DetectorFailure(msg) => {
                write!(f, "detection capability failed: {}", msg)
            }
        }
    }
}

// ********* Configuration **********

/// Tunable parameters of the image pipeline.
///
/// The defaults correspond to a 480x640 canonical frame and are calibrated
/// for ballot papers photographed at arm's length.
#[derive(PartialEq, Debug, Clone)]
pub struct ExtractionOptions {
    /// Width of the canonical rectified frame.
    pub canonical_width: u32,
    /// Height of the canonical rectified frame.
    pub canonical_height: u32,
    /// Sigma of the Gaussian blur applied before edge detection.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Width of the horizontal structuring element used to isolate
    /// separator rules.
    pub separator_kernel_width: u32,
    /// Minimum width for a detected separator line to count, in pixels of
    /// the canonical frame.
    pub min_separator_width: u32,
    /// Row slices smaller than this are dropped as noise and do not count
    /// toward sheet positions.
    pub min_row_width: u32,
    pub min_row_height: u32,
    /// Acceptance threshold for normalized cross-correlation template
    /// scores.
    pub template_threshold: f32,
    /// Vertical tolerance for associating a mark above/below a candidate
    /// name, whole-image detector variant.
    pub mark_tolerance: u32,
    /// Same tolerance for the per-row template variant, where coordinates
    /// span a single row.
    pub row_mark_tolerance: u32,
}

impl ExtractionOptions {
    pub const DEFAULT: ExtractionOptions = ExtractionOptions {
        canonical_width: 480,
        canonical_height: 640,
        blur_sigma: 1.0,
        canny_low: 0.0,
        canny_high: 125.0,
        separator_kernel_width: 40,
        min_separator_width: 300,
        min_row_width: 40,
        min_row_height: 40,
        template_threshold: 0.6,
        mark_tolerance: 20,
        row_mark_tolerance: 10,
    };
}

/// Normalizes a candidate name for comparison against the roster: all
/// whitespace removed, uppercased.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_invariant() {
        assert!(BoundingBox::new(10, 10, 20, 20).is_ok());
        assert_eq!(
            BoundingBox::new(20, 10, 10, 20),
            Err(ExtractionErrors::MalformedBoundingBox {
                x1: 20,
                y1: 10,
                x2: 10,
                y2: 20
            })
        );
        assert!(BoundingBox::new(10, 10, 20, 10).is_err());
        assert!(BoundingBox::new(10, 10, 10, 20).is_err());
    }

    #[test]
    fn symbol_labels() {
        assert_eq!(SymbolKind::from_label("cross"), Some(SymbolKind::Cross));
        assert_eq!(SymbolKind::from_label("X"), Some(SymbolKind::Cross));
        assert_eq!(SymbolKind::from_label(" 1 "), Some(SymbolKind::One));
        assert_eq!(SymbolKind::from_label("TWO"), Some(SymbolKind::Two));
        assert_eq!(SymbolKind::from_label("3"), Some(SymbolKind::Three));
        assert_eq!(SymbolKind::from_label("name"), None);
    }

    #[test]
    fn name_normalization() {
        assert_eq!(
            normalize_name("  Pamudu  Ranasinghe "),
            "PAMUDURANASINGHE".to_string()
        );
    }
}
