use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use film_profit::data::synthetic::{generate_films, write_csv, SimpleRng, SyntheticSpec};

/// Write a synthetic film table in the pipeline's input format.
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Number of films
    #[arg(long, default_value_t = 120)]
    rows: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, value_name = "FILE", default_value = "sample_films.csv")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let spec = SyntheticSpec {
        rows: args.rows,
        ..SyntheticSpec::default()
    };
    let films = generate_films(&spec, &mut SimpleRng::new(args.seed));

    let file = File::create(&args.out).with_context(|| format!("creating {}", args.out.display()))?;
    write_csv(&films, BufWriter::new(file))?;

    println!("Wrote {} films to {}", films.len(), args.out.display());
    Ok(())
}
