use anyhow::{Context, Result};
use chess_tensor_extractor::{
    write_batch, CorpusFormat, CorpusLoader, OutputPaths, PipelineConfig, PipelineDriver,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Corpus file: JSON array or JSON lines with `moves` and a label field,
    /// or PGN with the label in a header tag
    #[arg(long)]
    input_path: PathBuf,

    /// Corpus layout (json or pgn); guessed from the extension when omitted
    #[arg(long)]
    format: Option<CorpusFormat>,

    /// Where to save the occupancy tensor (.npz is appended if missing)
    #[arg(long)]
    output_path: PathBuf,

    /// Where to save the attack tensor
    #[arg(long)]
    output_path_attacks: PathBuf,

    /// Where to save the labels
    #[arg(long)]
    output_path_labels: PathBuf,

    /// Drop everything before this many half moves (openings may be memorised)
    #[arg(long)]
    min_ply_to_consider: Option<usize>,

    /// Drop everything after this many half moves (keeps a consistent length)
    #[arg(long)]
    max_ply_to_consider: Option<usize>,

    /// JSON pipeline configuration; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record field holding the label
    #[arg(long, default_value = chess_tensor_extractor::streaming_loader::DEFAULT_LABEL_FIELD)]
    label_field: String,

    /// Label for records without a label field
    #[arg(long, default_value_t = chess_tensor_extractor::streaming_loader::UNKNOWN_LABEL, allow_negative_numbers = true)]
    default_label: i64,

    /// Only keep games with min-ply < length < max-ply before extraction
    #[arg(long)]
    filter_length: bool,

    /// Worker threads for parallel extraction
    #[arg(long)]
    threads: Option<usize>,

    /// Process games one at a time
    #[arg(long)]
    sequential: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(plymin) = self.min_ply_to_consider {
            config.plymin = plymin;
        }
        if let Some(plymax) = self.max_ply_to_consider {
            config.plymax = plymax;
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if self.sequential {
            config.parallel = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.pipeline_config()?;

    println!("Chess Tensor Extractor");
    println!("======================");
    println!("Configuration:");
    println!("  • Input file: {}", args.input_path.display());
    println!("  • Ply window: [{}, {})", config.plymin, config.plymax);
    println!(
        "  • Mode: {}",
        if config.parallel {
            format!("parallel ({} threads)", config.worker_threads())
        } else {
            "sequential".to_string()
        }
    );
    println!();

    let start_time = Instant::now();

    let mut loader = CorpusLoader::new()
        .with_label_field(args.label_field.clone())
        .with_default_label(args.default_label);
    if let Some(format) = args.format {
        loader = loader.with_format(format);
    }
    if args.filter_length {
        loader = loader.with_length_filter(config.plymin, config.plymax);
    }
    let games = loader
        .load_path(&args.input_path)
        .with_context(|| format!("failed to load corpus {}", args.input_path.display()))?;

    let driver = PipelineDriver::new(config)?;
    let pb = ProgressBar::new(games.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Extracting [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("██░"),
    );
    let result = driver.run_with_progress(&games, Some(&pb));
    pb.finish_and_clear();
    let report = result.context("extraction produced no output")?;

    let paths = OutputPaths::new(
        &args.output_path,
        &args.output_path_attacks,
        &args.output_path_labels,
    );
    let written = write_batch(&report.batch, &paths).context("failed to write output tensors")?;

    let summary = &report.summary;
    println!("Extraction complete in {:.2}s", start_time.elapsed().as_secs_f64());
    println!("  • Games read: {}", summary.total);
    println!("  • Accumulated: {}", summary.accumulated);
    println!("  • Failed: {}", summary.failed);
    println!("  • Excluded (too short): {}", summary.excluded);
    for sample in &summary.failure_samples {
        println!("    - {sample}");
    }
    println!(
        "  • Occupancy {:?} -> {}",
        report.batch.occupancy.shape(),
        written.occupancy.display()
    );
    println!(
        "  • Attacks {:?} -> {}",
        report.batch.attacks.shape(),
        written.attacks.display()
    );
    println!(
        "  • Labels {:?} -> {}",
        report.batch.labels.shape(),
        written.labels.display()
    );

    Ok(())
}
