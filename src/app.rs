use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, error::ErrorKind};

use crate::config::ConvertConfig;
use crate::constants::config::DEFAULT_CONFIG_FILE;
use crate::constants::splits::ALL_SPLITS;
use crate::pipeline::{self, PipelineSummary};
use crate::sampling::SamplingStrategy;
use crate::splits::SplitRatios;

#[derive(Debug, Parser)]
#[command(
    name = "spv2-coco",
    disable_help_subcommand = true,
    about = "Convert SPEED+ v2 pose annotations into partitioned COCO datasets",
    long_about = "Load, validate, sample, and deterministically split SPEED+ v2 domains, then \
                  write COCO annotations, images, and provenance manifests.",
    after_help = "Settings come from the JSON config file; command-line flags override it."
)]
struct ConvertCli {
    #[arg(
        long,
        value_name = "PATH",
        help = "Configuration file (defaults to spv2_coco.json when present)"
    )]
    config: Option<PathBuf>,
    #[arg(long = "source-root", value_name = "PATH", help = "SPEED+ v2 dataset root")]
    source_root: Option<PathBuf>,
    #[arg(long = "output-root", value_name = "PATH", help = "Output dataset directory")]
    output_root: Option<PathBuf>,
    #[arg(long, help = "Deterministic seed for sampling and splitting")]
    seed: Option<u64>,
    #[arg(long = "sample-size", value_name = "FRACTION", help = "Fraction of each domain kept")]
    sample_size: Option<f64>,
    #[arg(long, value_enum, help = "Sampling strategy")]
    sampling: Option<SamplingStrategy>,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VALIDATION,TEST",
        value_parser = parse_split_ratios_arg,
        help = "Comma-separated split ratios that must sum to 1.0"
    )]
    split: Option<SplitRatios>,
    #[arg(long, help = "Domains processed concurrently")]
    workers: Option<usize>,
    #[arg(long, help = "Archive the output directory into <output-root>.zip")]
    zip: bool,
}

impl ConvertCli {
    fn resolve(self) -> Result<ConvertConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path, true)?,
            None => ConvertConfig::load(&PathBuf::from(DEFAULT_CONFIG_FILE), false)?,
        };
        if let Some(root) = self.source_root {
            config.source_root = root;
        }
        if let Some(root) = self.output_root {
            config.output_root = root;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(size) = self.sample_size {
            config.sample_size = size;
        }
        if let Some(strategy) = self.sampling {
            config.sampling = strategy;
        }
        if let Some(ratios) = self.split {
            config.train_ratio = ratios.train;
            config.val_ratio = ratios.validation;
            config.test_ratio = ratios.test;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.zip {
            config.zip_output = true;
        }
        Ok(config)
    }
}

/// Run the converter with CLI-style args; errors when any domain failed.
pub fn run_convert<I>(args: I) -> Result<(), Box<dyn Error>>
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    let Some(cli) = parse_cli::<ConvertCli, _>(args)? else {
        return Ok(());
    };
    let config = cli.resolve()?;
    let summary = pipeline::run(&config)?;
    print_summary(&summary);
    if !summary.is_success() {
        let failed = summary.failed_domains().count();
        let failed_jobs = summary.collaborators.iter().filter(|r| r.is_err()).count();
        let dataset = match &summary.translation_dataset {
            Some(Err(_)) => "; translation dataset failed",
            _ => "",
        };
        return Err(format!(
            "{failed} domain(s) and {failed_jobs} collaborator job(s) failed{dataset}"
        )
        .into());
    }
    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    println!("=== conversion summary ===");
    for outcome in &summary.domains {
        match &outcome.result {
            Ok(report) => {
                let counts: Vec<String> = ALL_SPLITS
                    .iter()
                    .map(|label| format!("{label}={}", report.count(*label)))
                    .collect();
                println!(
                    "  {:<10} ok      discarded={} {}",
                    outcome.domain,
                    report.discarded,
                    counts.join(" ")
                );
            }
            Err(err) => println!("  {:<10} FAILED  {err}", outcome.domain),
        }
    }
    match &summary.translation_dataset {
        Some(Ok(report)) => println!(
            "  translation dataset {} ok      A={} B={}",
            report.root.display(),
            report.source_images,
            report.target_images
        ),
        Some(Err(err)) => println!("  translation dataset FAILED  {err}"),
        None => {}
    }
    for (idx, result) in summary.collaborators.iter().enumerate() {
        match result {
            Ok(done) => println!("  job {idx}: ok in {:.1}s", done.elapsed.as_secs_f64()),
            Err(err) => println!("  job {idx}: FAILED {err}"),
        }
    }
    if let Some(archive) = &summary.archive {
        println!("  archive: {}", archive.display());
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_split_ratios_arg(raw: &str) -> Result<SplitRatios, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err("--split-ratios expects exactly 3 comma-separated values".to_string());
    }
    let parse = |name: &str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} ratio '{value}': must be a float"))
    };
    let ratios = SplitRatios::new(
        parse("train", parts[0])?,
        parse("validation", parts[1])?,
        parse("test", parts[2])?,
    );
    ratios.normalized().map_err(|err| err.to_string())
}
