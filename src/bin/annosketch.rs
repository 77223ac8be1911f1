use annosketch::canvas::{Canvas, ImageCanvas, OutputFormat};
use annosketch::diagram::Diagram;
use annosketch::feature_index::FeatureIndex;
use annosketch::layout::Layout;
use annosketch::range::Range;
use annosketch::stream::FeatureStream;
use annosketch::style::Style;
use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use std::path::PathBuf;
use std::process;

const DEFAULT_WIDTH: u32 = 800;

struct Arguments {
    output: PathBuf,
    inputs: Vec<PathBuf>,
    style: Option<PathBuf>,
    seqid: Option<String>,
    start: Option<u64>,
    end: Option<u64>,
    width: u32,
    format: String,
    sorted: bool,
    add_introns: bool,
    force: bool,
    verbose: bool,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
annosketch [options] image_file [GFF3_file ...]\n\n\
Create graphical representations of GFF3 annotation files.\n\
Reads from stdin when no GFF3 file is given.\n\n\
Options:\n  \
-style FILE     style file (default: builtin style)\n  \
-seqid ID       sequence region to draw (default: first one in input)\n  \
-start POS      start position (default: first region start)\n  \
-end POS        end position (default: last region end)\n  \
-width PIXELS   target image width (default: {DEFAULT_WIDTH})\n  \
-format FORMAT  output graphics format, png|svg (default: png)\n  \
-sorted         treat the input as sorted (single file or stdin)\n  \
-addintrons     add intron features between existing exon features\n  \
-force          force writing to the output file\n  \
-v              verbose output\n  \
-version        show version\n  \
-help           show this text"
    );
}

fn parse_number<T: std::str::FromStr>(option: &str, value: Option<&String>) -> Result<T> {
    let value = value.ok_or_else(|| anyhow::anyhow!("option {option} requires an argument"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("argument to option {option} must be a positive integer"))
}

fn parse_args(args: &[String]) -> Result<Arguments> {
    let mut style = None;
    let mut seqid = None;
    let mut start = None;
    let mut end = None;
    let mut width = DEFAULT_WIDTH;
    let mut format = "png".to_string();
    let mut sorted = false;
    let mut add_introns = false;
    let mut force = false;
    let mut verbose = false;
    let mut positional: Vec<String> = vec![];

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-style" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("option -style requires an argument"))?;
                style = Some(PathBuf::from(value));
                i += 1;
            }
            "-seqid" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("option -seqid requires an argument"))?;
                seqid = Some(value.clone());
                i += 1;
            }
            "-start" => {
                start = Some(parse_number("-start", args.get(i + 1))?);
                i += 1;
            }
            "-end" => {
                end = Some(parse_number("-end", args.get(i + 1))?);
                i += 1;
            }
            "-width" => {
                width = parse_number("-width", args.get(i + 1))?;
                i += 1;
            }
            "-format" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("option -format requires an argument"))?;
                format = value.clone();
                i += 1;
            }
            "-sorted" => sorted = true,
            "-addintrons" => add_introns = true,
            "-force" => force = true,
            "-v" => verbose = true,
            other if other.starts_with('-') && other.len() > 1 => {
                usage();
                bail!("unknown option: {other}");
            }
            _ => positional.push(arg.clone()),
        }
        i += 1;
    }

    if positional.is_empty() {
        usage();
        bail!("missing image file argument");
    }
    let output = PathBuf::from(positional.remove(0));
    let inputs = positional.into_iter().map(PathBuf::from).collect();

    Ok(Arguments {
        output,
        inputs,
        style,
        seqid,
        start,
        end,
        width,
        format,
        sorted,
        add_introns,
        force,
        verbose,
    })
}

fn main() {
    if let Err(e) = run() {
        eprintln!("annosketch: error: {e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-help" || a == "--help" || a == "-h") {
        usage();
        return Ok(());
    }
    if args.iter().any(|a| a == "-version" || a == "--version") {
        println!("annosketch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let arguments = parse_args(&args)?;
    if arguments.verbose {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        pretty_env_logger::init();
    }
    annosketch::initialize();

    match (arguments.start, arguments.end) {
        (Some(_), None) => bail!("option -start requires option -end"),
        (None, Some(_)) => bail!("option -end requires option -start"),
        (Some(start), Some(end)) if start >= end => bail!(
            "start of query range ({start}) must be before end of query range ({end})"
        ),
        _ => {}
    }
    if arguments.width < 1 {
        bail!("argument to option -width must be an integer >= 1");
    }
    if arguments.output.exists() && !arguments.force {
        bail!(
            "file \"{}\" exists already. use option -force to overwrite",
            arguments.output.display()
        );
    }
    let format = OutputFormat::from_name(&arguments.format)?;

    let style = match &arguments.style {
        Some(path) => Style::load(path)?,
        None => annosketch::DEFAULT_STYLE.clone(),
    };

    let stream = if arguments.sorted {
        if arguments.inputs.len() > 1 {
            bail!("sorted mode reads a single GFF3 file or stdin");
        }
        FeatureStream::sorted(arguments.inputs.first().map(PathBuf::as_path))
    } else {
        FeatureStream::unsorted(&arguments.inputs)
    };
    let stream = if arguments.add_introns {
        stream.with_introns()
    } else {
        stream
    };

    let mut index = FeatureIndex::new();
    index.add_stream(stream)?;

    let seqid = match arguments.seqid {
        Some(seqid) => {
            if !index.has_seq_id(&seqid) {
                bail!("sequence region '{seqid}' does not exist in input");
            }
            seqid
        }
        None => index
            .first_seq_id()
            .context("GFF3 input must contain a sequence region")?
            .to_string(),
    };

    let region_range = index.range_for(&seqid)?;
    let query = Range::new(
        arguments.start.unwrap_or_else(|| region_range.start()),
        arguments.end.unwrap_or_else(|| region_range.end()),
    )?;

    let diagram = Diagram::build(&index, &seqid, query, &style)?;
    let layout = Layout::build(diagram, arguments.width, &style)?;
    let height = layout.height()?;

    let mut canvas = ImageCanvas::new(format, arguments.width, height.ceil() as u32)?;
    canvas.sketch(&layout)?;
    canvas.write(&arguments.output)?;
    info!(
        "wrote '{}' ({}x{} px)",
        arguments.output.display(),
        arguments.width,
        height.ceil() as u32
    );
    Ok(())
}
