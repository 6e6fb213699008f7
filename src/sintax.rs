//! SINTAX Taxonomy Classification
//!
//! Non-Bayesian taxonomy assignment (Edgar 2016): the reference database is
//! indexed as posting lists over unique 8-mers, and each query is classified
//! by repeatedly subsampling its words, voting for the reference with the
//! most shared words, and reading per-rank confidences off the vote
//! distribution.
//!
//! # Index layout
//!
//! Posting lists are packed into one contiguous array addressed by
//! `(starts[word], lens[word])`, built in two passes (count, then fill).
//! Identical taxonomy strings across references are collapsed into one
//! unique-taxonomy slot so votes for indistinguishable references agree.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::kmer::{WordExtractor, WORD_SPACE};
use crate::labels;
use crate::rng::{Lcg, Mwc};

/// Bootstrap iterations per strand.
pub const DEFAULT_BOOT_ITERS: usize = 100;

/// Words drawn (with replacement) per bootstrap iteration.
const BOOT_SUBSET: usize = 32;

/// Queries with fewer unique words than this are unclassifiable.
const MIN_QUERY_WORDS: usize = 8;

/// Queries dispatched per worker round-trip in batch mode.
const CHUNK: usize = 64;

struct UniqTax {
    /// Normalised full taxonomy string (tie-break key).
    label: String,
    /// Ordered rank tokens, e.g. `["d:Bacteria", "p:Firmicutes"]`.
    ranks: Vec<String>,
    /// Interned id per rank token, shared across taxonomies.
    rank_ids: Vec<u32>,
}

/// Immutable posting-list index over a reference database.
pub struct SintaxIndex {
    uniq: Vec<UniqTax>,
    /// Reference sequence -> unique-taxonomy slot.
    seq_tax: Vec<u32>,
    starts: Vec<u32>,
    lens: Vec<u32>,
    data: Vec<u32>,
    n_seqs: usize,
}

impl SintaxIndex {
    /// Builds the index from parallel sequence/taxonomy arrays.
    ///
    /// Mismatched lengths are truncated to the shorter side; references
    /// with an empty rank list are dropped.
    pub fn build(seqs: &[String], tax_strings: &[String]) -> Self {
        let n = seqs.len().min(tax_strings.len());

        let mut uniq: Vec<UniqTax> = Vec::new();
        let mut uniq_by_label: FxHashMap<String, u32> = FxHashMap::default();
        let mut rank_interner: FxHashMap<String, u32> = FxHashMap::default();
        let mut kept_seqs: Vec<&String> = Vec::new();
        let mut seq_tax: Vec<u32> = Vec::new();

        for (seq, tax) in seqs.iter().zip(tax_strings.iter()).take(n) {
            let ranks = labels::split_ranks(tax);
            if ranks.is_empty() {
                continue;
            }
            let label = ranks.join(",");
            let slot = *uniq_by_label.entry(label.clone()).or_insert_with(|| {
                let rank_ids = ranks
                    .iter()
                    .map(|r| {
                        let next = rank_interner.len() as u32;
                        *rank_interner.entry(r.clone()).or_insert(next)
                    })
                    .collect();
                uniq.push(UniqTax {
                    label,
                    ranks,
                    rank_ids,
                });
                (uniq.len() - 1) as u32
            });
            kept_seqs.push(seq);
            seq_tax.push(slot);
        }

        // Pass 1: posting-list lengths.
        let mut extractor = WordExtractor::new();
        let mut words = Vec::new();
        let mut lens = vec![0u32; WORD_SPACE];
        for seq in &kept_seqs {
            extractor.unique_words(seq.as_bytes(), &mut words);
            for &w in &words {
                lens[w as usize] += 1;
            }
        }

        let mut starts = vec![0u32; WORD_SPACE];
        let mut total = 0u32;
        for w in 0..WORD_SPACE {
            starts[w] = total;
            total += lens[w];
        }

        // Pass 2: fill.
        let mut cursor = starts.clone();
        let mut data = vec![0u32; total as usize];
        for (sid, seq) in kept_seqs.iter().enumerate() {
            extractor.unique_words(seq.as_bytes(), &mut words);
            for &w in &words {
                data[cursor[w as usize] as usize] = sid as u32;
                cursor[w as usize] += 1;
            }
        }

        let n_seqs = kept_seqs.len();
        Self {
            uniq,
            seq_tax,
            starts,
            lens,
            data,
            n_seqs,
        }
    }

    pub fn n_seqs(&self) -> usize {
        self.n_seqs
    }

    fn postings(&self, word: u16) -> &[u32] {
        let start = self.starts[word as usize] as usize;
        let len = self.lens[word as usize] as usize;
        &self.data[start..start + len]
    }
}

/// Per-worker mutable scratch; create once, reuse for every query.
pub struct SintaxWorkspace {
    extractor: WordExtractor,
    words: Vec<u16>,
    target_hits: Vec<u32>,
    touched: Vec<u32>,
    tax_votes: Vec<u32>,
    voted_tax: Vec<u32>,
    ties: Vec<u32>,
    lcg: Lcg,
    mwc: Mwc,
}

impl SintaxWorkspace {
    pub fn new(index: &SintaxIndex) -> Self {
        Self {
            extractor: WordExtractor::new(),
            words: Vec::new(),
            target_hits: vec![0; index.n_seqs],
            touched: Vec::new(),
            tax_votes: vec![0; index.uniq.len()],
            voted_tax: Vec::new(),
            ties: Vec::new(),
            lcg: Lcg::new(1),
            mwc: Mwc::new(1),
        }
    }
}

/// Classification of one query: predicted ranks with cumulative per-rank
/// confidences. Empty `ranks` means unclassified.
#[derive(Debug, Clone)]
pub struct SintaxHit {
    pub ranks: Vec<String>,
    pub probs: Vec<f64>,
    pub strand: char,
}

impl SintaxHit {
    fn unclassified() -> Self {
        Self {
            ranks: Vec::new(),
            probs: Vec::new(),
            strand: '+',
        }
    }

    pub fn is_classified(&self) -> bool {
        !self.ranks.is_empty()
    }
}

struct StrandResult {
    ranks: Vec<String>,
    probs: Vec<f64>,
    /// Highest single-iteration word-hit count; discriminates the true
    /// strand from one that only got random fallback votes.
    best_hits: u32,
}

/// In-place k-th smallest (0-based) selection; deterministic pivot.
fn quickselect(values: &mut [u32], k: usize) -> u32 {
    let (mut lo, mut hi) = (0usize, values.len() - 1);
    loop {
        if lo == hi {
            return values[lo];
        }
        let pivot = values[(lo + hi) / 2];
        let (mut i, mut j) = (lo, hi);
        while i <= j {
            while values[i] < pivot {
                i += 1;
            }
            while values[j] > pivot {
                j -= 1;
            }
            if i <= j {
                values.swap(i, j);
                i += 1;
                if j == 0 {
                    break;
                }
                j -= 1;
            }
        }
        if k <= j {
            hi = j;
        } else if k >= i {
            lo = i;
        } else {
            return values[k];
        }
    }
}

fn classify_strand(
    index: &SintaxIndex,
    ws: &mut SintaxWorkspace,
    seq: &[u8],
    reverse: bool,
    boot_iters: usize,
) -> Option<StrandResult> {
    ws.lcg.reseed(1);
    ws.mwc.reseed(1);

    if reverse {
        ws.extractor.unique_words_rc(seq, &mut ws.words);
    } else {
        ws.extractor.unique_words(seq, &mut ws.words);
    }
    if ws.words.len() < MIN_QUERY_WORDS {
        return None;
    }

    for &t in &ws.voted_tax {
        ws.tax_votes[t as usize] = 0;
    }
    ws.voted_tax.clear();

    let mut best_hits = 0u32;
    for _ in 0..boot_iters {
        for &t in &ws.touched {
            ws.target_hits[t as usize] = 0;
        }
        ws.touched.clear();

        for _ in 0..BOOT_SUBSET {
            let word = ws.words[ws.lcg.below(ws.words.len())];
            for &sid in index.postings(word) {
                if ws.target_hits[sid as usize] == 0 {
                    ws.touched.push(sid);
                }
                ws.target_hits[sid as usize] += 1;
            }
        }

        let target = if ws.touched.is_empty() {
            // No sampled word matched anything: vote for an arbitrary
            // reference so the iteration still counts.
            ws.mwc.below(index.n_seqs)
        } else {
            let top = ws
                .touched
                .iter()
                .map(|&t| ws.target_hits[t as usize])
                .max()
                .unwrap_or(0);
            best_hits = best_hits.max(top);
            ws.ties.clear();
            ws.ties.extend(
                ws.touched
                    .iter()
                    .copied()
                    .filter(|&t| ws.target_hits[t as usize] == top),
            );
            if ws.ties.len() == 1 {
                ws.ties[0] as usize
            } else {
                let k = ws.mwc.below(ws.ties.len());
                quickselect(&mut ws.ties, k) as usize
            }
        };

        let tax = index.seq_tax[target] as usize;
        if ws.tax_votes[tax] == 0 {
            ws.voted_tax.push(tax as u32);
        }
        ws.tax_votes[tax] += 1;
    }

    // Top taxonomy: most votes, ties to the lexicographically smallest
    // full taxonomy string.
    let top_tax = *ws.voted_tax.iter().min_by(|&&a, &&b| {
        let (va, vb) = (ws.tax_votes[a as usize], ws.tax_votes[b as usize]);
        vb.cmp(&va)
            .then_with(|| index.uniq[a as usize].label.cmp(&index.uniq[b as usize].label))
    })? as usize;

    let top = &index.uniq[top_tax];
    let mut probs = Vec::with_capacity(top.ranks.len());
    let mut cumulative = 1.0f64;
    for (depth, &rank_id) in top.rank_ids.iter().enumerate() {
        let mut votes_at_rank = 0u32;
        for &t in &ws.voted_tax {
            if index.uniq[t as usize].rank_ids.get(depth) == Some(&rank_id) {
                votes_at_rank += ws.tax_votes[t as usize];
            }
        }
        cumulative *= votes_at_rank as f64 / boot_iters as f64;
        probs.push(cumulative);
    }

    Some(StrandResult {
        ranks: top.ranks.clone(),
        probs,
        best_hits,
    })
}

/// Classifies one query against both strands.
pub fn classify(
    index: &SintaxIndex,
    ws: &mut SintaxWorkspace,
    seq: &[u8],
    boot_iters: usize,
) -> SintaxHit {
    if index.n_seqs == 0 {
        return SintaxHit::unclassified();
    }

    let fwd = classify_strand(index, ws, seq, false, boot_iters);
    let rev = classify_strand(index, ws, seq, true, boot_iters);

    let (strand, result) = match (fwd, rev) {
        (None, None) => return SintaxHit::unclassified(),
        (Some(f), None) => ('+', f),
        (None, Some(r)) => ('-', r),
        (Some(f), Some(r)) => {
            if r.best_hits > f.best_hits {
                ('-', r)
            } else {
                ('+', f)
            }
        }
    };

    SintaxHit {
        ranks: result.ranks,
        probs: result.probs,
        strand,
    }
}

/// Classifies a batch of queries, optionally in parallel.
///
/// `threads == 1` runs sequentially; any other value fans out over the
/// current rayon pool in fixed-size chunks with one workspace per worker.
/// Results are index-aligned with `queries` and independent of the worker
/// count.
pub fn classify_batch(
    index: &SintaxIndex,
    queries: &[String],
    boot_iters: usize,
    threads: usize,
) -> Vec<SintaxHit> {
    if threads == 1 {
        let mut ws = SintaxWorkspace::new(index);
        return queries
            .iter()
            .map(|q| classify(index, &mut ws, q.as_bytes(), boot_iters))
            .collect();
    }

    queries
        .par_chunks(CHUNK)
        .map_init(
            || SintaxWorkspace::new(index),
            |ws, chunk| {
                chunk
                    .iter()
                    .map(|q| classify(index, ws, q.as_bytes(), boot_iters))
                    .collect::<Vec<SintaxHit>>()
            },
        )
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::reverse_complement;

    const REF1: &str = "ACGGTCAGGATCCGATCGATTGCACCATGGTACGATCCGGTTACGGATCGATTACCGGATG";
    const REF2: &str = "TTGACCGGTAATCGTCAGGCACCAGGTTAAACCGGTTGACACGTTGCAATCCGGAATTGGC";
    const REF3: &str = "GGCATTCCGGAATCAGGACCATTGCCAGTTGGACGGTCATTCCAGGGACTTCCGGTATTGA";

    fn single_ref_index() -> SintaxIndex {
        SintaxIndex::build(
            &[REF1.to_string()],
            &["d:Bacteria,p:Firmicutes,g:Testus".to_string()],
        )
    }

    #[test]
    fn test_exact_self_hit() {
        let index = single_ref_index();
        let mut ws = SintaxWorkspace::new(&index);
        let hit = classify(&index, &mut ws, REF1.as_bytes(), DEFAULT_BOOT_ITERS);

        assert_eq!(hit.strand, '+');
        assert_eq!(
            hit.ranks,
            vec!["d:Bacteria", "p:Firmicutes", "g:Testus"]
        );
        assert!(hit.probs.iter().all(|&p| p >= 0.99), "{:?}", hit.probs);
    }

    #[test]
    fn test_reverse_complement_hits_minus_strand() {
        let index = single_ref_index();
        let mut ws = SintaxWorkspace::new(&index);
        let rc = reverse_complement(REF1);
        let hit = classify(&index, &mut ws, rc.as_bytes(), DEFAULT_BOOT_ITERS);

        assert_eq!(hit.strand, '-');
        assert_eq!(
            hit.ranks,
            vec!["d:Bacteria", "p:Firmicutes", "g:Testus"]
        );
    }

    #[test]
    fn test_short_or_broken_queries_are_unclassified() {
        let index = single_ref_index();
        let mut ws = SintaxWorkspace::new(&index);

        let short = classify(&index, &mut ws, b"ACGT", DEFAULT_BOOT_ITERS);
        assert!(!short.is_classified());

        // Every 8-mer window is interrupted by an N.
        let broken = "ACGTACGNACGTACGNACGTACGNACGTACGN";
        let hit = classify(&index, &mut ws, broken.as_bytes(), DEFAULT_BOOT_ITERS);
        assert!(!hit.is_classified());
    }

    #[test]
    fn test_duplicate_taxonomies_collapse() {
        let seqs = vec![REF1.to_string(), REF2.to_string(), REF3.to_string()];
        let taxes = vec![
            "d:Bacteria,p:Proteobacteria,g:Alpha".to_string(),
            "d:Bacteria,p:Proteobacteria,g:Alpha".to_string(),
            "d:Bacteria,p:Firmicutes,g:Beta".to_string(),
        ];
        let index = SintaxIndex::build(&seqs, &taxes);
        assert_eq!(index.uniq.len(), 2);

        let mut ws = SintaxWorkspace::new(&index);
        let hit = classify(&index, &mut ws, REF1.as_bytes(), DEFAULT_BOOT_ITERS);
        assert_eq!(hit.ranks.last().map(String::as_str), Some("g:Alpha"));
    }

    #[test]
    fn test_mismatched_input_lengths_truncate() {
        let seqs = vec![REF1.to_string(), REF2.to_string()];
        let taxes = vec!["d:Bacteria,g:Only".to_string()];
        let index = SintaxIndex::build(&seqs, &taxes);
        assert_eq!(index.n_seqs(), 1);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let seqs = vec![REF1.to_string(), REF2.to_string(), REF3.to_string()];
        let taxes = vec![
            "d:Bacteria,g:One".to_string(),
            "d:Bacteria,g:Two".to_string(),
            "d:Archaea,g:Three".to_string(),
        ];
        let index = SintaxIndex::build(&seqs, &taxes);
        let mut ws = SintaxWorkspace::new(&index);

        let a = classify(&index, &mut ws, REF2.as_bytes(), DEFAULT_BOOT_ITERS);
        let b = classify(&index, &mut ws, REF2.as_bytes(), DEFAULT_BOOT_ITERS);
        assert_eq!(a.ranks, b.ranks);
        assert_eq!(a.probs, b.probs);
        assert_eq!(a.strand, b.strand);
    }

    #[test]
    fn test_cumulative_probs_never_increase() {
        let seqs = vec![REF1.to_string(), REF2.to_string()];
        let taxes = vec![
            "d:Bacteria,p:Firmicutes,g:One".to_string(),
            "d:Bacteria,p:Firmicutes,g:Two".to_string(),
        ];
        let index = SintaxIndex::build(&seqs, &taxes);
        let mut ws = SintaxWorkspace::new(&index);
        let hit = classify(&index, &mut ws, REF1.as_bytes(), DEFAULT_BOOT_ITERS);
        for pair in hit.probs.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn test_batch_matches_single_and_parallel() {
        let seqs = vec![REF1.to_string(), REF2.to_string(), REF3.to_string()];
        let taxes = vec![
            "d:Bacteria,g:One".to_string(),
            "d:Bacteria,g:Two".to_string(),
            "d:Archaea,g:Three".to_string(),
        ];
        let index = SintaxIndex::build(&seqs, &taxes);
        let queries: Vec<String> = seqs.clone();

        let seq_results = classify_batch(&index, &queries, DEFAULT_BOOT_ITERS, 1);
        let par_results = classify_batch(&index, &queries, DEFAULT_BOOT_ITERS, 0);
        assert_eq!(seq_results.len(), par_results.len());
        for (a, b) in seq_results.iter().zip(&par_results) {
            assert_eq!(a.ranks, b.ranks);
            assert_eq!(a.strand, b.strand);
            assert_eq!(a.probs, b.probs);
        }
    }
}
