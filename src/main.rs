use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use film_profit::config::PipelineConfig;
use film_profit::data::sentiment::LexiconScorer;
use film_profit::pipeline;
use film_profit::report::{render_summary, PipelineReport};

#[derive(Parser, Debug)]
#[command(name = "film-profit")]
#[command(version)]
#[command(about = "Clean a film release table and fit net-profit models", long_about = None)]
struct Args {
    /// Delimited input table (`.tsv`/`.tab` for tabs, comma otherwise)
    input: PathBuf,

    /// TOML file overriding pipeline constants
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write every artifact as JSON
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let output = pipeline::run(&args.input, &config, &LexiconScorer::default())
        .with_context(|| format!("analysing {}", args.input.display()))?;

    print!("{}", render_summary(&output));

    if let Some(path) = &args.json {
        let json = PipelineReport::new(&output)
            .to_json()
            .context("serialising report")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
