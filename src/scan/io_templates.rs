use log::{debug, warn};

use std::fs;
use std::path::Path;

use ballot_extraction::{SymbolKind, TemplateLibrary};
use snafu::prelude::*;

use crate::scan::*;

/// Loads the mark template library from a directory. Each image file is
/// keyed by its stem: `cross.png` loads as the cross template, `1.png` as
/// the rank-one digit, and so on. Files with unrecognized stems are
/// skipped with a warning.
pub fn load_template_library(dir: &Path, threshold: f32) -> ScanResult<TemplateLibrary> {
    let entries = fs::read_dir(dir).context(OpeningFileSnafu {
        path: dir.display().to_string(),
    })?;
    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let kind = match SymbolKind::from_label(stem) {
            Some(kind) => kind,
            None => {
                warn!("skipping template with unrecognized label: {:?}", path);
                continue;
            }
        };
        let img = image::open(&path).context(OpeningImageSnafu {
            path: path.display().to_string(),
        })?;
        debug!("loaded template {:?} as {}", path, kind.as_str());
        templates.push((kind, img.to_luma8()));
    }

    TemplateLibrary::new(templates, threshold).context(ExtractionSnafu {
        path: dir.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn loads_labeled_templates_and_skips_the_rest() {
        let dir = std::env::temp_dir().join("ballotscan_template_library_test");
        fs::create_dir_all(&dir).unwrap();
        let glyph = GrayImage::from_pixel(20, 20, Luma([0u8]));
        glyph.save(dir.join("cross.png")).unwrap();
        glyph.save(dir.join("1.png")).unwrap();
        glyph.save(dir.join("scribble.png")).unwrap();
        fs::write(dir.join("readme.txt"), "not a template").unwrap();

        let library = load_template_library(&dir, 0.6).unwrap();
        // Only cross.png and 1.png carry known labels.
        let row = image::RgbImage::from_pixel(100, 50, image::Rgb([255u8, 255, 255]));
        assert!(library.best_match(&row).is_none());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = std::env::temp_dir().join("ballotscan_template_library_empty_test");
        fs::create_dir_all(&dir).unwrap();
        assert!(load_template_library(&dir, 0.6).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
