use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use zotu::cli;
use zotu::labels;
use zotu::seqio::{self, FastaFile};
use zotu::sintax::{classify_batch, SintaxHit, SintaxIndex};

/// Parse and validate a confidence cutoff [0.0-1.0]
fn parse_cutoff(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=1.0).contains(&val) {
        Err(format!("cutoff must be between 0.0 and 1.0, got {}", val))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "sintax")]
#[command(version)]
#[command(about = "SINTAX taxonomy classification of amplicon reads")]
#[command(long_about = r#"
sintax - bootstrapped k-mer taxonomy assignment

The reference FASTA must carry ;tax=...; annotations, e.g.
  >AB0001;tax=d:Bacteria,p:Firmicutes,c:Bacilli,g:Bacillus;

Each query is classified on both strands by repeated 8-mer subsampling
against the reference posting lists. Output is one TSV line per query:

  name <TAB> rank(conf),... <TAB> strand <TAB> passed-ranks

where passed-ranks is the longest rank prefix with confidence >= cutoff.
Unclassified queries emit '*' fields.

EXAMPLES:
  sintax -i reads.fasta -d silva_16s.fasta.gz -t hits.tsv
  sintax -i reads.fasta -d refs.fasta -c 0.9 --threads 0
"#)]
struct Args {
    /// Query FASTA/FASTQ (.gz supported)
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Input")]
    input: PathBuf,

    /// Reference FASTA with ;tax=...; annotations (.gz supported)
    #[arg(short = 'd', long = "db", value_name = "FILE", help_heading = "Input")]
    db: PathBuf,

    /// Output TSV (default: stdout)
    #[arg(short = 't', long, value_name = "FILE", help_heading = "Output")]
    tabbedout: Option<PathBuf>,

    /// Confidence cutoff for reported ranks [0.0-1.0]
    #[arg(short = 'c', long, value_name = "FLOAT", default_value = "0.8",
          value_parser = parse_cutoff, help_heading = "Classification")]
    cutoff: f64,

    /// Bootstrap iterations per strand
    #[arg(long = "boot-iters", value_name = "NUM", default_value = "100", help_heading = "Classification")]
    boot_iters: usize,

    /// Number of threads [1 = sequential, 0 = auto]
    #[arg(long, value_name = "NUM", default_value = "1", help_heading = "Runtime")]
    threads: usize,

    /// Verbose output to stderr
    #[arg(short = 'v', long, help_heading = "Runtime")]
    verbose: bool,
}

fn format_hit(name: &str, hit: &SintaxHit, cutoff: f64) -> String {
    if !hit.is_classified() {
        return format!("{}\t*\t{}\t*", name, hit.strand);
    }

    let annotated: Vec<String> = hit
        .ranks
        .iter()
        .zip(&hit.probs)
        .map(|(rank, prob)| format!("{}({:.4})", rank, prob))
        .collect();

    let passed: Vec<&str> = hit
        .ranks
        .iter()
        .zip(&hit.probs)
        .take_while(|(_, prob)| **prob >= cutoff)
        .map(|(rank, _)| rank.as_str())
        .collect();
    let passed = if passed.is_empty() {
        "*".to_string()
    } else {
        passed.join(",")
    };

    format!("{}\t{}\t{}\t{}", name, annotated.join(","), hit.strand, passed)
}

fn main() -> Result<()> {
    let args: Args = cli::parse_or_exit();
    let threads = cli::configure_threads(args.threads);

    let mut ref_seqs = Vec::new();
    let mut ref_taxes = Vec::new();
    let mut reader = FastaFile::open(&args.db)?;
    while let Some(record) = reader.read_next()? {
        let tax = labels::parse_tax(&record.name).unwrap_or("").to_string();
        ref_seqs.push(record.seq);
        ref_taxes.push(tax);
    }
    let index = SintaxIndex::build(&ref_seqs, &ref_taxes);
    if args.verbose {
        eprintln!(
            "Indexed {} of {} reference sequences",
            index.n_seqs(),
            ref_seqs.len()
        );
    }

    let queries = seqio::read_sequences(&args.input)?;
    let seqs: Vec<String> = queries.iter().map(|(_, s)| s.clone()).collect();
    let hits = classify_batch(&index, &seqs, args.boot_iters, threads);

    let sink: Box<dyn Write> = match args.tabbedout {
        Some(ref path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut out = BufWriter::new(sink);
    for ((name, _), hit) in queries.iter().zip(&hits) {
        writeln!(out, "{}", format_hit(name, hit, args.cutoff))?;
    }

    if args.verbose {
        let classified = hits.iter().filter(|h| h.is_classified()).count();
        eprintln!("Classified {}/{} queries", classified, hits.len());
    }

    Ok(())
}
