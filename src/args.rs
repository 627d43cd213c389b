use clap::Parser;

/// This is a ballot paper scanning program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The file describing the scan: candidates, ballot sources and rules.
    /// (Only JSON scan descriptions are currently supported)
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference file containing the expected scan summary in JSON format. If provided, ballotscan will
    /// check that the computed output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the scan will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The ballot input to process: an image file, a directory of images, an OCR transcript
    /// or a detections file, depending on --input-type. Overrides the sources of the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default image) The type of the input: 'image', 'text' or 'detections'.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (directory path) The directory holding the mark template images, named after their symbol
    /// (cross.png, 1.png, ...). Required when processing images without a config file.
    #[clap(long, value_parser)]
    pub templates: Option<String>,

    /// (list of comma-separated values or not specified) The candidate names in printed sheet order.
    /// Required when no config file is given.
    #[clap(long, value_parser, use_value_delimiter = true)]
    pub candidates: Option<Vec<String>>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
