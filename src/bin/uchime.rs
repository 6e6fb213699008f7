use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use zotu::cli;
use zotu::labels;
use zotu::seqio::FastaFile;
use zotu::uchime::{flag_chimeras, UchimeParams};
use zotu::unoise::{Centroid, SeqRecord};

#[derive(Parser)]
#[command(name = "uchime")]
#[command(version)]
#[command(about = "Flag de novo PCR chimeras among abundance-annotated sequences")]
#[command(long_about = r#"
uchime - UCHIME2-style de novo chimera detection

Each input sequence is aligned against every sufficiently more abundant
one; a sequence whose left part matches one parent and right part a
different parent is flagged chimeric. Input headers must carry ;size=N;
abundance annotations.

With --threads 1 the scan is sequential and already-flagged sequences
are excluded as parents for later queries. Parallel modes evaluate every
query against the full parent pool, so results are identical for any
worker count.

EXAMPLES:
  uchime -i centroids.fasta --output clean.fasta --summary report.tsv
  uchime -i centroids.fasta --output clean.fasta --threads 0
"#)]
struct Args {
    /// Input FASTA with ;size=N; annotations (.gz supported)
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Input")]
    input: PathBuf,

    /// Output FASTA with non-chimeric sequences, headers preserved
    #[arg(long, value_name = "FILE", help_heading = "Output")]
    output: Option<PathBuf>,

    /// Summary TSV: id, size, status (ok/chimera)
    #[arg(long, value_name = "FILE", help_heading = "Output")]
    summary: Option<PathBuf>,

    /// Minimum parent/query abundance skew for chimera candidates
    #[arg(long = "min-skew", value_name = "FLOAT", default_value = "16", help_heading = "Detection")]
    min_skew: f64,

    /// Number of threads [1 = sequential, 0 = auto]
    #[arg(long, value_name = "NUM", default_value = "1", help_heading = "Runtime")]
    threads: usize,

    /// Verbose output to stderr
    #[arg(short = 'v', long, help_heading = "Runtime")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    let threads = cli::configure_threads(args.threads);

    let records = FastaFile::open(&args.input)?.read_all()?;

    // The detector expects descending abundance; remember each record's
    // input position so reports keep the original order.
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(labels::parse_size(&records[i].name)));

    let centroids: Vec<Centroid> = order
        .iter()
        .map(|&i| {
            let size = labels::parse_size(&records[i].name);
            Centroid {
                record: SeqRecord {
                    id: records[i].name.clone(),
                    seq: records[i].seq.clone(),
                    size,
                },
                total_size: size,
            }
        })
        .collect();

    let sorted_flags = flag_chimeras(
        &centroids,
        &UchimeParams {
            min_ab_skew: args.min_skew,
            threads,
        },
    );

    let mut flags = vec![false; records.len()];
    for (sorted_pos, &input_pos) in order.iter().enumerate() {
        flags[input_pos] = sorted_flags[sorted_pos];
    }

    let n_chimeras = flags.iter().filter(|&&f| f).count();
    if args.verbose {
        eprintln!(
            "Scanned {} sequences, flagged {} chimeras",
            records.len(),
            n_chimeras
        );
    }

    if let Some(ref out_path) = args.output {
        let mut out = BufWriter::new(
            File::create(out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?,
        );
        for (record, &chimera) in records.iter().zip(&flags) {
            if !chimera {
                writeln!(out, ">{}", record.name)?;
                writeln!(out, "{}", record.seq)?;
            }
        }
    }

    if let Some(ref summary_path) = args.summary {
        let mut tsv = BufWriter::new(
            File::create(summary_path)
                .with_context(|| format!("Failed to create {}", summary_path.display()))?,
        );
        for (record, &chimera) in records.iter().zip(&flags) {
            writeln!(
                tsv,
                "{}\t{}\t{}",
                record.name,
                labels::parse_size(&record.name),
                if chimera { "chimera" } else { "ok" }
            )?;
        }
    }

    Ok(())
}
