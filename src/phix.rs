//! PhiX Contamination Filtering
//!
//! Illumina runs are spiked with PhiX174 as a sequencing control, and a
//! fraction of those reads survives demultiplexing into amplicon libraries.
//! The filter marks every 8-mer on both strands of the bundled PhiX174
//! genome in a 65,536-entry table and scores reads by 8-mer containment,
//! which is far cheaper than alignment and insensitive to single errors.
//!
//! The table is built once on first use and shared read-only for the
//! lifetime of the program.

use std::sync::LazyLock;

use crate::kmer::{base_code, WORD_LEN, WORD_SPACE};

pub const DEFAULT_MIN_ID: f64 = 0.97;
pub const DEFAULT_MIN_KMERS: usize = 8;

static PHIX_FASTA: &str = include_str!("phix174.fasta");

struct PhixTable {
    words: Vec<bool>,
    seq_len: usize,
}

static TABLE: LazyLock<PhixTable> = LazyLock::new(|| {
    // Concatenate the reference, skipping headers and anything non-ACGT.
    let genome: Vec<u16> = PHIX_FASTA
        .lines()
        .filter(|line| !line.starts_with('>'))
        .flat_map(|line| line.bytes())
        .filter_map(base_code)
        .collect();

    let mut words = vec![false; WORD_SPACE];
    mark_words(genome.iter().copied(), &mut words);
    mark_words(genome.iter().rev().map(|&c| c ^ 0b11), &mut words);

    PhixTable {
        words,
        seq_len: genome.len(),
    }
});

fn mark_words(codes: impl Iterator<Item = u16>, words: &mut [bool]) {
    let mut word: u16 = 0;
    let mut run = 0usize;
    for code in codes {
        word = (word << 2) | code;
        run += 1;
        if run >= WORD_LEN {
            words[word as usize] = true;
        }
    }
}

/// Length of the bundled PhiX174 reference in bases.
pub fn phix_seq_len() -> usize {
    TABLE.seq_len
}

/// Counts the valid 8-mer windows of `seq` and how many are PhiX words.
fn word_stats(seq: &[u8]) -> (usize, usize) {
    let table = &TABLE.words;
    let mut word: u16 = 0;
    let mut run = 0usize;
    let (mut windows, mut hits) = (0usize, 0usize);
    for &b in seq {
        match base_code(b) {
            Some(code) => {
                word = (word << 2) | code;
                run += 1;
            }
            None => {
                run = 0;
                continue;
            }
        }
        if run >= WORD_LEN {
            windows += 1;
            if table[word as usize] {
                hits += 1;
            }
        }
    }
    (windows, hits)
}

/// Fraction of the valid 8-mers of `seq` that occur in PhiX (either
/// strand); 0 when the read has no valid 8-mer.
pub fn phix_score(seq: &[u8]) -> f64 {
    let (windows, hits) = word_stats(seq);
    if windows == 0 {
        return 0.0;
    }
    hits as f64 / windows as f64
}

/// Whether `seq` looks like a PhiX read.
///
/// Requires at least `min_kmers` valid 8-mers (too-short reads are never
/// flagged) and a containment score of at least `min_id^8`, the expected
/// 8-mer survival rate at `min_id` sequence identity.
pub fn is_phix(seq: &[u8], min_id: f64, min_kmers: usize) -> bool {
    let (windows, hits) = word_stats(seq);
    if windows < min_kmers {
        return false;
    }
    hits as f64 / windows as f64 >= min_id.powi(WORD_LEN as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 140-base window of the bundled reference.
    fn phix_snippet() -> String {
        PHIX_FASTA
            .lines()
            .filter(|l| !l.starts_with('>'))
            .collect::<String>()[100..240]
            .to_string()
    }

    // E. coli 16S rRNA gene, 5' end.
    const ECOLI_16S: &str = "AAATTGAAGAGTTTGATCATGGCTCAGATTGAACGCTGGCGGCAGGCCTAACACATGCAAGTCGAACGGTAACAGGAAGAAGCTTGCTTCTTTGCTGACGAGTGGCGGACGGGTGAGTAATGTCTGGGAAACTGCCTGAT";

    #[test]
    fn test_reference_length() {
        assert_eq!(phix_seq_len(), 5386);
    }

    #[test]
    fn test_phix_snippet_scores_high() {
        let snippet = phix_snippet();
        assert!(phix_score(snippet.as_bytes()) >= 0.7);
        assert!(is_phix(snippet.as_bytes(), DEFAULT_MIN_ID, DEFAULT_MIN_KMERS));
    }

    #[test]
    fn test_reverse_strand_read_is_caught() {
        let rc = crate::kmer::reverse_complement(&phix_snippet());
        assert!(is_phix(rc.as_bytes(), DEFAULT_MIN_ID, DEFAULT_MIN_KMERS));
    }

    #[test]
    fn test_foreign_sequence_scores_low() {
        assert!(phix_score(ECOLI_16S.as_bytes()) < 0.3);
        assert!(!is_phix(
            ECOLI_16S.as_bytes(),
            DEFAULT_MIN_ID,
            DEFAULT_MIN_KMERS
        ));
    }

    #[test]
    fn test_short_reads_are_never_flagged() {
        assert!(!is_phix(b"ACGTACG", 0.0, DEFAULT_MIN_KMERS));
        assert!(!is_phix(b"", 0.0, DEFAULT_MIN_KMERS));
        assert_eq!(phix_score(b"ACGT"), 0.0);
    }
}
