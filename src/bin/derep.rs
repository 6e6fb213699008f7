use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use zotu::cli;
use zotu::derep::dereplicate;
use zotu::seqio;

#[derive(Parser)]
#[command(name = "derep")]
#[command(version)]
#[command(about = "Dereplicate reads into size-annotated unique sequences")]
#[command(long_about = r#"
derep - exact dereplication

Collapses identical reads (case-insensitive) into one record per
distinct sequence, annotated with its abundance:

  >read_id;size=113;

Output is sorted by abundance descending, ready for 'zotu'. Reads that
already carry ;size=N; annotations contribute N instead of 1.

EXAMPLES:
  derep -i reads.fq.gz -o uniques.fasta
  derep -i merged.fasta -o uniques.fasta --min-size 2
"#)]
struct Args {
    /// Input FASTA/FASTQ (.gz supported)
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Input")]
    input: PathBuf,

    /// Output FASTA with ;size=N; annotations
    #[arg(short = 'o', long, value_name = "FILE", help_heading = "Output")]
    output: PathBuf,

    /// Drop unique sequences with abundance below this
    #[arg(long = "min-size", value_name = "NUM", default_value = "1", help_heading = "Filtering")]
    min_size: u64,

    /// Verbose output to stderr
    #[arg(short = 'v', long, help_heading = "Runtime")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();

    let reads = seqio::read_sequences(&args.input)?;
    let n_reads = reads.len();
    let records = dereplicate(reads, args.min_size);

    let mut out = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );
    for record in &records {
        writeln!(out, ">{};size={};", record.id, record.size)?;
        writeln!(out, "{}", record.seq)?;
    }

    if args.verbose {
        eprintln!(
            "Dereplicated {} reads into {} unique sequences",
            n_reads,
            records.len()
        );
    }

    Ok(())
}
