use std::fs;
use std::path::Path;

use log::debug;
use snafu::prelude::*;

use crate::scan::*;

/// Reads a line-printer OCR transcript of a ballot paper.
pub fn read_transcript(path: &Path) -> ScanResult<String> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu {
        path: path.display().to_string(),
    })?;
    debug!("read transcript ({} bytes)", contents.len());
    Ok(contents)
}
