use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use zotu::cli;
use zotu::labels;
use zotu::seqio::FastaFile;
use zotu::uchime::{flag_chimeras, UchimeParams};
use zotu::unoise::{denoise, SeqRecord, UnoiseParams};

/// Parse and validate the denoising alpha (must be positive)
fn parse_alpha(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if val <= 0.0 {
        Err(format!("alpha must be positive, got {}", val))
    } else {
        Ok(val)
    }
}

/// Parse and validate the chimera abundance skew (must be >= 1)
fn parse_min_skew(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if val < 1.0 {
        Err(format!("min-skew must be at least 1, got {}", val))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "zotu")]
#[command(version)]
#[command(about = "Denoise dereplicated amplicon reads into chimera-free ZOTUs")]
#[command(long_about = r#"
zotu - UNOISE3 denoising with UCHIME2 chimera removal

Takes a dereplicated FASTA (headers carrying ;size=N; abundance
annotations, e.g. from 'derep') and produces zero-radius OTUs:

  1. Sequences are clustered greedily in descending abundance; each
     sequence joins the closest centroid within an abundance-dependent
     error budget or seeds a new centroid.
  2. Centroids are screened for PCR chimeras against their more-abundant
     peers and flagged centroids are dropped.

OUTPUT:
  ZOTU FASTA        Labels Zotu1, Zotu2, ... in descending abundance
  -t/--tabbedout    Per-centroid TSV: id, seed size, total size, status

EXAMPLES:
  zotu -i uniques.fasta -z zotus.fasta
  zotu -i uniques.fasta -z zotus.fasta -a 2.0 -m 8 -t centroids.tsv
"#)]
struct Args {
    /// Dereplicated FASTA with ;size=N; annotations (.gz supported)
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Input")]
    input: PathBuf,

    /// Output FASTA of denoised, chimera-free ZOTUs
    #[arg(short = 'z', long, value_name = "FILE", help_heading = "Output")]
    zotus: PathBuf,

    /// Per-centroid TSV report (id, size, total_size, status)
    #[arg(short = 't', long, value_name = "FILE", help_heading = "Output")]
    tabbedout: Option<PathBuf>,

    /// Denoising alpha; larger values admit fewer errors per cluster
    #[arg(short = 'a', long, value_name = "FLOAT", default_value = "2.0",
          value_parser = parse_alpha, help_heading = "Denoising")]
    alpha: f64,

    /// Minimum abundance for a sequence to seed a centroid
    #[arg(short = 'm', long, value_name = "NUM", default_value = "8", help_heading = "Denoising")]
    minsize: u64,

    /// Minimum parent/query abundance skew for chimera candidates
    #[arg(long = "min-skew", value_name = "FLOAT", default_value = "16",
          value_parser = parse_min_skew, help_heading = "Chimera Removal")]
    min_skew: f64,

    /// Number of threads for chimera screening [1 = sequential, 0 = auto]
    #[arg(long, value_name = "NUM", default_value = "1", help_heading = "Runtime")]
    threads: usize,

    /// Verbose output to stderr (progress and statistics)
    #[arg(short = 'v', long, help_heading = "Runtime")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    let start_time = Instant::now();
    let threads = cli::configure_threads(args.threads);

    let mut records = Vec::new();
    let mut reader = FastaFile::open(&args.input)?;
    while let Some(record) = reader.read_next()? {
        let size = labels::parse_size(&record.name);
        records.push(SeqRecord {
            id: record.name,
            seq: record.seq,
            size,
        });
    }
    if args.verbose {
        eprintln!("Read {} dereplicated sequences", records.len());
    }

    let centroids = denoise(
        records,
        &UnoiseParams {
            alpha: args.alpha,
            min_size: args.minsize,
        },
    );
    if args.verbose {
        eprintln!("Denoised to {} centroids", centroids.len());
    }

    let flags = flag_chimeras(
        &centroids,
        &UchimeParams {
            min_ab_skew: args.min_skew,
            threads,
        },
    );
    let n_chimeras = flags.iter().filter(|&&f| f).count();
    if args.verbose {
        eprintln!("Flagged {} chimeras", n_chimeras);
    }

    let mut out = BufWriter::new(
        File::create(&args.zotus)
            .with_context(|| format!("Failed to create {}", args.zotus.display()))?,
    );
    let mut zotu_num = 0usize;
    for (centroid, &chimera) in centroids.iter().zip(&flags) {
        if chimera {
            continue;
        }
        zotu_num += 1;
        writeln!(out, ">Zotu{}", zotu_num)?;
        writeln!(out, "{}", centroid.record.seq)?;
    }

    if let Some(ref tsv_path) = args.tabbedout {
        let mut tsv = BufWriter::new(
            File::create(tsv_path)
                .with_context(|| format!("Failed to create {}", tsv_path.display()))?,
        );
        writeln!(tsv, "id\tsize\ttotal_size\tstatus")?;
        for (centroid, &chimera) in centroids.iter().zip(&flags) {
            writeln!(
                tsv,
                "{}\t{}\t{}\t{}",
                centroid.record.id,
                centroid.record.size,
                centroid.total_size,
                if chimera { "chimera" } else { "zotu" }
            )?;
        }
    }

    if args.verbose {
        eprintln!(
            "Wrote {} ZOTUs to {} ({:.1}s)",
            zotu_num,
            args.zotus.display(),
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
