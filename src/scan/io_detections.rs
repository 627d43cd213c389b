use std::fs;
use std::path::Path;

use ballot_extraction::{BoundingBox, Detection};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::scan::*;

/// One detection as serialized by the external detector run: the class
/// label, the box as `[x1, y1, x2, y2]` and the confidence score.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub label: String,
    #[serde(rename = "box")]
    pub bounds: [u32; 4],
    pub confidence: f32,
}

pub fn read_detections(path: &Path) -> ScanResult<Vec<Detection>> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path.display().to_string(),
    })?;
    parse_detections(&contents)
}

/// Parses a JSON array of detection records. Boxes are not validated here;
/// the extraction pipeline rejects malformed ones.
pub fn parse_detections(contents: &str) -> ScanResult<Vec<Detection>> {
    let records: Vec<DetectionRecord> =
        serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    Ok(records
        .into_iter()
        .map(|r| Detection {
            label: r.label,
            bounds: BoundingBox {
                x1: r.bounds[0],
                y1: r.bounds[1],
                x2: r.bounds[2],
                y2: r.bounds[3],
            },
            confidence: r.confidence,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_detection_file() {
        let raw = r#"[
            { "label": "PAMUDU RANASINGHE", "box": [20, 10, 300, 50], "confidence": 0.97 },
            { "label": "cross", "box": [400, 15, 430, 45], "confidence": 0.88 }
        ]"#;
        let detections = parse_detections(raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].label, "cross");
        assert_eq!(detections[1].bounds.x1, 400);
        assert_eq!(detections[1].bounds.y2, 45);
        assert!((detections[1].confidence - 0.88).abs() < 1e-6);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_detections("{not json").is_err());
    }
}
