use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use zotu::cli;
use zotu::phix;
use zotu::seqio::{FastqFile, FastqRecord};

/// Parse and validate the identity threshold [0.5-1.0]
fn parse_min_id(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.5..=1.0).contains(&val) {
        Err(format!("min-id must be between 0.5 and 1.0, got {}", val))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "remove_phix")]
#[command(version)]
#[command(about = "Remove PhiX control reads from FASTQ files")]
#[command(long_about = r#"
remove_phix - PhiX174 spike-in decontamination

Scores each read by the fraction of its 8-mers found in the PhiX174
genome (either strand) and drops reads scoring at least min-id^8.
Reads with fewer than --min-kmers valid 8-mers are always kept.

Single-end:  remove_phix -i reads.fq.gz -o clean.fq
Paired-end:  remove_phix -1 R1.fq.gz -2 R2.fq.gz -o clean_R1.fq -O clean_R2.fq

In paired mode, --paired-mode strict removes a pair when either mate is
PhiX; lenient only when both are.
"#)]
struct Args {
    /// Single-end FASTQ input (.gz supported)
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Input",
          conflicts_with_all = ["r1", "r2"])]
    input: Option<PathBuf>,

    /// Forward reads FASTQ (paired mode)
    #[arg(short = '1', long, value_name = "FILE", requires = "r2", help_heading = "Input")]
    r1: Option<PathBuf>,

    /// Reverse reads FASTQ (paired mode)
    #[arg(short = '2', long, value_name = "FILE", requires = "r1", help_heading = "Input")]
    r2: Option<PathBuf>,

    /// Output FASTQ (single-end, or forward reads in paired mode)
    #[arg(short = 'o', long, value_name = "FILE", help_heading = "Output")]
    output: PathBuf,

    /// Output FASTQ for reverse reads (paired mode)
    #[arg(short = 'O', long = "output2", value_name = "FILE", help_heading = "Output")]
    output2: Option<PathBuf>,

    /// TSV report: reads_in, reads_removed, pct_removed
    #[arg(short = 't', long, value_name = "FILE", help_heading = "Output")]
    tabbedout: Option<PathBuf>,

    /// Minimum approximate identity to call a read PhiX [0.5-1.0]
    #[arg(long = "min-id", value_name = "FLOAT", default_value = "0.97",
          value_parser = parse_min_id, help_heading = "Filtering")]
    min_id: f64,

    /// Minimum number of valid 8-mers for a read to be testable
    #[arg(long = "min-kmers", value_name = "NUM", default_value = "8", help_heading = "Filtering")]
    min_kmers: usize,

    /// Pair removal policy: remove when either mate ('strict') or both
    /// mates ('lenient') look like PhiX
    #[arg(long = "paired-mode", value_name = "MODE", default_value = "strict",
          value_parser = ["strict", "lenient"], help_heading = "Filtering")]
    paired_mode: String,

    /// Number of threads [1 = sequential, 0 = auto]
    #[arg(long, value_name = "NUM", default_value = "1", help_heading = "Runtime")]
    threads: usize,
}

fn read_fastq(path: &Path) -> Result<Vec<FastqRecord>> {
    FastqFile::open(path)?.read_all()
}

fn phix_flags(records: &[FastqRecord], min_id: f64, min_kmers: usize, threads: usize) -> Vec<bool> {
    if threads == 1 {
        records
            .iter()
            .map(|r| phix::is_phix(r.seq.as_bytes(), min_id, min_kmers))
            .collect()
    } else {
        records
            .par_iter()
            .map(|r| phix::is_phix(r.seq.as_bytes(), min_id, min_kmers))
            .collect()
    }
}

fn write_kept<'a>(
    path: &Path,
    records: impl Iterator<Item = &'a FastqRecord>,
) -> Result<()> {
    let mut out = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
    );
    for record in records {
        writeln!(out, "@{}\n{}\n+\n{}", record.name, record.seq, record.qual)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    let threads = cli::configure_threads(args.threads);

    let (reads_in, reads_removed) = if let Some(ref input) = args.input {
        let records = read_fastq(input)?;
        let flags = phix_flags(&records, args.min_id, args.min_kmers, threads);

        let removed = flags.iter().filter(|&&f| f).count();
        write_kept(
            &args.output,
            records
                .iter()
                .zip(&flags)
                .filter(|(_, &f)| !f)
                .map(|(r, _)| r),
        )?;
        (records.len(), removed)
    } else if let (Some(r1), Some(r2)) = (&args.r1, &args.r2) {
        let output2 = match args.output2 {
            Some(ref p) => p,
            None => anyhow::bail!("-O/--output2 is required in paired mode"),
        };

        let mut fwd = read_fastq(r1)?;
        let mut rev = read_fastq(r2)?;
        // Truncate to the shorter file rather than aborting on a ragged pair.
        let n = fwd.len().min(rev.len());
        fwd.truncate(n);
        rev.truncate(n);

        let fwd_flags = phix_flags(&fwd, args.min_id, args.min_kmers, threads);
        let rev_flags = phix_flags(&rev, args.min_id, args.min_kmers, threads);
        let remove: Vec<bool> = fwd_flags
            .iter()
            .zip(&rev_flags)
            .map(|(&f, &r)| {
                if args.paired_mode == "lenient" {
                    f && r
                } else {
                    f || r
                }
            })
            .collect();

        let removed_pairs = remove.iter().filter(|&&f| f).count();
        write_kept(
            &args.output,
            fwd.iter()
                .zip(&remove)
                .filter(|(_, &f)| !f)
                .map(|(r, _)| r),
        )?;
        write_kept(
            output2,
            rev.iter()
                .zip(&remove)
                .filter(|(_, &f)| !f)
                .map(|(r, _)| r),
        )?;
        (2 * n, 2 * removed_pairs)
    } else {
        anyhow::bail!("Provide either -i (single-end) or -1/-2 (paired)");
    };

    let pct = if reads_in > 0 {
        100.0 * reads_removed as f64 / reads_in as f64
    } else {
        0.0
    };

    if let Some(ref report_path) = args.tabbedout {
        let mut tsv = BufWriter::new(
            File::create(report_path)
                .with_context(|| format!("Failed to create {}", report_path.display()))?,
        );
        writeln!(tsv, "reads_in\treads_removed\tpct_removed")?;
        writeln!(tsv, "{}\t{}\t{:.2}", reads_in, reads_removed, pct)?;
    }

    println!(
        "reads_in={} reads_removed={} pct={:.2}%",
        reads_in, reads_removed, pct
    );

    Ok(())
}
