use log::{debug, info, warn};

use ballot_extraction::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::scan::config_reader::*;

pub mod io_detections;
pub mod io_templates;
pub mod io_text;

#[derive(Debug, Snafu)]
pub enum ScanError {
    #[snafu(display("Error opening image {path}"))]
    OpeningImage {
        source: image::ImageError,
        path: String,
    },
    #[snafu(display("Error reading file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display(""))]
    OpeningJson { source: std::io::Error },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display(""))]
    MissingParentDir {},
    #[snafu(display("Ballot {path} could not be processed"))]
    Extraction {
        source: ExtractionErrors,
        path: String,
    },
    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type ScanResult<T> = Result<T, ScanError>;

pub mod config_reader {
    use crate::scan::*;

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct OutputSettings {
        #[serde(rename = "contestName")]
        pub contest_name: String,
        #[serde(rename = "outputDirectory")]
        pub output_directory: Option<String>,
        #[serde(rename = "contestDate")]
        pub contest_date: Option<String>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct BallotSource {
        pub provider: String,
        #[serde(rename = "filePath")]
        pub file_path: String,
        #[serde(rename = "templateDirectory")]
        pub template_directory: Option<String>,
    }

    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScanCandidate {
        pub name: String,
        pub code: Option<String>,
    }

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScanRules {
        #[serde(rename = "templateThreshold")]
        pub template_threshold: Option<f32>,
        #[serde(rename = "markTolerance")]
        pub mark_tolerance: Option<u32>,
        #[serde(rename = "rowMarkTolerance")]
        pub row_mark_tolerance: Option<u32>,
        #[serde(rename = "minSeparatorWidth")]
        pub min_separator_width: Option<u32>,
    }

    #[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct ScanConfig {
        #[serde(rename = "outputSettings")]
        pub output_settings: OutputSettings,
        #[serde(rename = "ballotFileSources")]
        pub ballot_file_sources: Vec<BallotSource>,
        pub candidates: Vec<ScanCandidate>,
        pub rules: Option<ScanRules>,
    }

    pub fn read_config(path: &str) -> ScanResult<ScanConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        let config: ScanConfig =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(config)
    }

    pub fn read_summary(path: String) -> ScanResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        debug!("read content: {:?}", contents);
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }
}

/// Turns the optional rules section into concrete pipeline options, filling
/// the gaps with the calibrated defaults.
pub fn validate_rules(rules: &Option<ScanRules>) -> ExtractionOptions {
    let mut options = ExtractionOptions::DEFAULT;
    if let Some(r) = rules {
        if let Some(x) = r.template_threshold {
            options.template_threshold = x;
        }
        if let Some(x) = r.mark_tolerance {
            options.mark_tolerance = x;
        }
        if let Some(x) = r.row_mark_tolerance {
            options.row_mark_tolerance = x;
        }
        if let Some(x) = r.min_separator_width {
            options.min_separator_width = x;
        }
    }
    options
}

fn mark_to_json(m: &Mark) -> JSValue {
    json!({
        "symbol": m.kind.as_str(),
        "confidence": m.confidence,
        "box": [m.bounds.x1, m.bounds.y1, m.bounds.x2, m.bounds.y2],
    })
}

fn ballot_to_json(file_name: &str, ballot: &Ballot) -> JSValue {
    let records: Vec<JSValue> = ballot
        .records
        .iter()
        .map(|r| {
            json!({
                "sheetPosition": r.sheet_position,
                "candidateName": r.candidate_name,
                "mark": r.mark.as_ref().map(mark_to_json),
            })
        })
        .collect();
    json!({
        "file": file_name,
        "records": records,
        "isValid": ballot.is_valid,
        "firstPreference": ballot.first_preference,
        "secondPreference": ballot.second_preference,
        "thirdPreference": ballot.third_preference,
        "rejectionReason": ballot.rejection.map(|r| r.as_str()),
    })
}

fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}

fn process_image(
    path: &Path,
    library: &TemplateLibrary,
    ctx: &ExtractionContext,
) -> ScanResult<JSValue> {
    let display = path.display().to_string();
    let image = image::open(path)
        .context(OpeningImageSnafu {
            path: display.clone(),
        })?
        .to_rgb8();
    let ballot = extract_ballot(&image, &MarkSource::Templates(library), ctx)
        .context(ExtractionSnafu { path: display })?;
    Ok(ballot_to_json(&simplify_file_name(path), &ballot))
}

pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

fn list_image_files(path: &Path) -> ScanResult<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let entries = fs::read_dir(path).context(OpeningFileSnafu {
        path: path.display().to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn process_source(
    root_path: &Path,
    source: &BallotSource,
    ctx: &ExtractionContext,
) -> ScanResult<Vec<JSValue>> {
    let p: PathBuf = root_path.join(&source.file_path);
    info!("Attempting to read ballot source {:?}", p);
    match source.provider.as_str() {
        "image" => {
            let template_dir = match &source.template_directory {
                Some(d) => root_path.join(d),
                None => whatever!("image sources require a templateDirectory"),
            };
            let library = io_templates::load_template_library(
                &template_dir,
                ctx.options.template_threshold,
            )?;
            let files = list_image_files(&p)?;
            info!("processing {} ballot image(s)", files.len());
            // One bad photograph must not take the rest of the batch down:
            // per-ballot failures are reported in the summary instead.
            let results: Vec<JSValue> = files
                .par_iter()
                .map(|f| match process_image(f, &library, ctx) {
                    Ok(js) => js,
                    Err(e) => {
                        warn!("ballot {:?} failed: {}", f, e);
                        json!({
                            "file": simplify_file_name(f),
                            "error": format!("{}", e),
                        })
                    }
                })
                .collect();
            Ok(results)
        }
        "text" => {
            let text = io_text::read_transcript(&p)?;
            let ballot = extract_from_transcript(&text, ctx);
            Ok(vec![ballot_to_json(&simplify_file_name(&p), &ballot)])
        }
        "detections" => {
            let detections = io_detections::read_detections(&p)?;
            let ballot = extract_from_detections(&detections, ctx).context(ExtractionSnafu {
                path: p.display().to_string(),
            })?;
            Ok(vec![ballot_to_json(&simplify_file_name(&p), &ballot)])
        }
        x => whatever!("Provider not implemented {:?}", x),
    }
}

fn build_summary_js(config: &ScanConfig, ballots: &[JSValue]) -> JSValue {
    let valid = ballots
        .iter()
        .filter(|b| b["isValid"].as_bool().unwrap_or(false))
        .count();
    json!({
        "config": {
            "contest": config.output_settings.contest_name,
            "date": config.output_settings.contest_date,
        },
        "ballots": ballots,
        "counts": {
            "processed": ballots.len(),
            "valid": valid,
            "rejected": ballots.len() - valid,
        },
    })
}

fn config_from_args(args: &Args) -> ScanResult<ScanConfig> {
    let input = match &args.input {
        Some(input) => input.clone(),
        None => whatever!("either --config or --input must be provided"),
    };
    let candidates = match &args.candidates {
        Some(names) if !names.is_empty() => names
            .iter()
            .map(|n| ScanCandidate {
                name: n.clone(),
                code: None,
            })
            .collect(),
        _ => whatever!("--candidates is required when no config file is given"),
    };
    Ok(ScanConfig {
        output_settings: OutputSettings {
            contest_name: "ballot scan".to_string(),
            output_directory: None,
            contest_date: None,
        },
        ballot_file_sources: vec![BallotSource {
            provider: args.input_type.clone().unwrap_or_else(|| "image".to_string()),
            file_path: input,
            template_directory: args.templates.clone(),
        }],
        candidates,
        rules: None,
    })
}

pub fn run_scan(args: &Args) -> ScanResult<()> {
    let (config, root_p) = match &args.config {
        Some(config_path) => {
            let config = read_config(config_path)?;
            let root = Path::new(config_path.as_str())
                .parent()
                .context(MissingParentDirSnafu {})?
                .to_path_buf();
            (config, root)
        }
        None => (config_from_args(args)?, PathBuf::from(".")),
    };
    info!("config: {:?}", config);

    if config.ballot_file_sources.is_empty() {
        whatever!("no ballot sources detected");
    }

    let ctx = ExtractionContext {
        candidates: config.candidates.iter().map(|c| c.name.clone()).collect(),
        options: validate_rules(&config.rules),
    };

    let mut ballots: Vec<JSValue> = Vec::new();
    for source in config.ballot_file_sources.iter() {
        let mut results = process_source(&root_p, source, &ctx)?;
        ballots.append(&mut results);
    }

    let result_js = build_summary_js(&config, &ballots);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;

    match &args.out {
        Some(out_path) if out_path.as_str() != "stdout" => {
            fs::write(out_path, &pretty_js_stats).context(OpeningFileSnafu {
                path: out_path.clone(),
            })?;
            info!("summary written to {}", out_path);
        }
        _ => println!("summary:{}", pretty_js_stats),
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = args.reference.clone() {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_scan_config() {
        let raw = r#"{
            "outputSettings": {
                "contestName": "School board election"
            },
            "ballotFileSources": [
                {
                    "provider": "image",
                    "filePath": "ballots/",
                    "templateDirectory": "templates/"
                }
            ],
            "candidates": [
                { "name": "PAMUDU RANASINGHE" },
                { "name": "KASUN JAYAWARDENA", "code": "KJ" }
            ],
            "rules": {
                "templateThreshold": 0.7,
                "markTolerance": 15
            }
        }"#;
        let config: ScanConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.output_settings.contest_name, "School board election");
        assert_eq!(config.ballot_file_sources[0].provider, "image");
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.candidates[1].code, Some("KJ".to_string()));

        let options = validate_rules(&config.rules);
        assert_eq!(options.template_threshold, 0.7);
        assert_eq!(options.mark_tolerance, 15);
        // Unspecified rules keep their defaults.
        assert_eq!(
            options.row_mark_tolerance,
            ExtractionOptions::DEFAULT.row_mark_tolerance
        );
    }

    #[test]
    fn missing_rules_section_keeps_defaults() {
        assert_eq!(validate_rules(&None), ExtractionOptions::DEFAULT);
    }

    #[test]
    fn ballot_json_shape() {
        let records = vec![AssociationRecord {
            sheet_position: 1,
            candidate_name: "PAMUDU RANASINGHE".to_string(),
            mark: Some(Mark {
                kind: SymbolKind::Cross,
                confidence: 0.8,
                bounds: BoundingBox {
                    x1: 400,
                    y1: 10,
                    x2: 430,
                    y2: 40,
                },
            }),
        }];
        let ballot = assemble(records);
        let js = ballot_to_json("vote_1.png", &ballot);
        assert_eq!(js["file"], json!("vote_1.png"));
        assert_eq!(js["isValid"], json!(true));
        assert_eq!(js["firstPreference"], json!("PAMUDU RANASINGHE"));
        assert_eq!(js["rejectionReason"], json!(null));
        assert_eq!(js["records"][0]["sheetPosition"], json!(1));
        assert_eq!(js["records"][0]["mark"]["symbol"], json!("cross"));
    }

    #[test]
    fn summary_counts_valid_and_rejected() {
        let config = ScanConfig {
            output_settings: OutputSettings {
                contest_name: "test".to_string(),
                output_directory: None,
                contest_date: None,
            },
            ballot_file_sources: vec![],
            candidates: vec![],
            rules: None,
        };
        let ballots = vec![
            json!({"isValid": true}),
            json!({"isValid": false}),
            json!({"error": "no ballot boundary found in image"}),
        ];
        let js = build_summary_js(&config, &ballots);
        assert_eq!(js["counts"]["processed"], json!(3));
        assert_eq!(js["counts"]["valid"], json!(1));
        assert_eq!(js["counts"]["rejected"], json!(2));
    }

    #[test]
    fn config_from_args_requires_candidates() {
        let args = Args {
            config: None,
            reference: None,
            out: None,
            input: Some("vote_1.png".to_string()),
            input_type: None,
            templates: Some("templates/".to_string()),
            candidates: None,
            verbose: false,
        };
        assert!(config_from_args(&args).is_err());
    }
}
