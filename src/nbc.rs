//! Naive Bayesian Taxonomy Classification
//!
//! RDP-style classifier (Wang et al. 2007) over a taxonomy tree. Reference
//! sequences with identical rank paths share tree nodes; each node
//! accumulates the unique 8-mers of every reference passing through it.
//! Classification walks the tree greedily by posterior log-likelihood, and
//! per-rank confidence is the fraction of bootstrap re-descents that agree
//! with the deterministic path.
//!
//! Nodes live in a flat vector and reference each other by index, which
//! keeps the tree free of self-referential ownership.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::kmer::WordExtractor;
use crate::labels;
use crate::rng::Lcg;

pub const DEFAULT_BOOT_ITERS: usize = 100;
pub const DEFAULT_MIN_WORDS: usize = 8;

/// Queries dispatched per worker round-trip in batch mode.
const CHUNK: usize = 64;

struct Node {
    name: String,
    depth: usize,
    children: Vec<usize>,
    seq_count: u64,
    word_counts: FxHashMap<u16, u32>,
}

/// Immutable taxonomy tree built from a reference database.
pub struct NbcIndex {
    nodes: Vec<Node>,
}

const ROOT: usize = 0;

impl NbcIndex {
    /// Builds the tree from parallel sequence/taxonomy arrays. Mismatched
    /// lengths truncate to the shorter side; empty rank lists are dropped.
    pub fn build(seqs: &[String], tax_strings: &[String]) -> Self {
        let mut nodes = vec![Node {
            name: String::new(),
            depth: 0,
            children: Vec::new(),
            seq_count: 0,
            word_counts: FxHashMap::default(),
        }];

        let mut extractor = WordExtractor::new();
        let mut words = Vec::new();
        let n = seqs.len().min(tax_strings.len());
        for (seq, tax) in seqs.iter().zip(tax_strings.iter()).take(n) {
            let ranks = labels::split_ranks(tax);
            if ranks.is_empty() {
                continue;
            }
            extractor.unique_words(seq.as_bytes(), &mut words);

            let mut node = ROOT;
            nodes[ROOT].seq_count += 1;
            for rank in &ranks {
                let child = match nodes[node]
                    .children
                    .iter()
                    .find(|&&c| nodes[c].name == *rank)
                {
                    Some(&c) => c,
                    None => {
                        let c = nodes.len();
                        let depth = nodes[node].depth + 1;
                        nodes.push(Node {
                            name: rank.clone(),
                            depth,
                            children: Vec::new(),
                            seq_count: 0,
                            word_counts: FxHashMap::default(),
                        });
                        nodes[node].children.push(c);
                        c
                    }
                };
                nodes[child].seq_count += 1;
                for &w in &words {
                    *nodes[child].word_counts.entry(w).or_insert(0) += 1;
                }
                node = child;
            }
        }

        Self { nodes }
    }

    pub fn n_refs(&self) -> u64 {
        self.nodes[ROOT].seq_count
    }
}

/// Per-worker mutable scratch; create once, reuse for every query.
pub struct NbcWorkspace {
    extractor: WordExtractor,
    words: Vec<u16>,
    sample: Vec<u16>,
    det_path: Vec<usize>,
    boot_path: Vec<usize>,
    winners: Vec<usize>,
    lcg: Lcg,
}

impl NbcWorkspace {
    pub fn new(_index: &NbcIndex) -> Self {
        Self {
            extractor: WordExtractor::new(),
            words: Vec::new(),
            sample: Vec::new(),
            det_path: Vec::new(),
            boot_path: Vec::new(),
            winners: Vec::new(),
            lcg: Lcg::new(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NbcParams {
    pub boot_iters: usize,
    /// Floor on the bootstrap subsample size (`max(min_words, |words|/8)`).
    pub min_words: usize,
}

impl Default for NbcParams {
    fn default() -> Self {
        Self {
            boot_iters: DEFAULT_BOOT_ITERS,
            min_words: DEFAULT_MIN_WORDS,
        }
    }
}

/// Classification of one query. Empty `ranks` means unclassified; `score`
/// is the total log-likelihood of the chosen path (-inf when unclassified).
#[derive(Debug, Clone)]
pub struct NbcHit {
    pub ranks: Vec<String>,
    pub probs: Vec<f64>,
    pub strand: char,
    pub score: f64,
}

impl NbcHit {
    fn unclassified() -> Self {
        Self {
            ranks: Vec::new(),
            probs: Vec::new(),
            strand: '+',
            score: f64::NEG_INFINITY,
        }
    }

    pub fn is_classified(&self) -> bool {
        !self.ranks.is_empty()
    }
}

/// Greedy root-to-leaf walk maximising
/// `log prior + sum log((count(w)+1)/(seq_count+2))` per level.
///
/// With `rng`, ties are broken uniformly among the winners; without it the
/// first child in insertion order wins.
fn descend(
    index: &NbcIndex,
    words: &[u16],
    mut rng: Option<&mut Lcg>,
    winners: &mut Vec<usize>,
    path: &mut Vec<usize>,
) -> f64 {
    path.clear();
    let mut node = ROOT;
    let mut total = 0.0f64;

    loop {
        let children = &index.nodes[node].children;
        if children.is_empty() {
            break;
        }
        let sibling_total: u64 = children.iter().map(|&c| index.nodes[c].seq_count).sum();
        let prior_denom = (sibling_total + children.len() as u64) as f64;

        let mut best = f64::NEG_INFINITY;
        winners.clear();
        for &c in children {
            let child = &index.nodes[c];
            let mut score = ((child.seq_count + 1) as f64 / prior_denom).ln();
            let denom = (child.seq_count + 2) as f64;
            for w in words {
                let count = child.word_counts.get(w).copied().unwrap_or(0);
                score += ((count + 1) as f64 / denom).ln();
            }
            if score > best {
                best = score;
                winners.clear();
                winners.push(c);
            } else if score == best {
                winners.push(c);
            }
        }

        let chosen = match rng.as_deref_mut() {
            Some(r) if winners.len() > 1 => winners[r.below(winners.len())],
            _ => winners[0],
        };
        total += best;
        path.push(chosen);
        node = chosen;
    }

    total
}

struct StrandResult {
    path: Vec<usize>,
    probs: Vec<f64>,
    score: f64,
}

fn classify_strand(
    index: &NbcIndex,
    ws: &mut NbcWorkspace,
    seq: &[u8],
    reverse: bool,
    params: &NbcParams,
) -> Option<StrandResult> {
    ws.lcg.reseed(1);

    if reverse {
        ws.extractor.unique_words_rc(seq, &mut ws.words);
    } else {
        ws.extractor.unique_words(seq, &mut ws.words);
    }
    if ws.words.is_empty() {
        return None;
    }

    let score = descend(index, &ws.words, None, &mut ws.winners, &mut ws.det_path);
    if ws.det_path.is_empty() {
        return None;
    }

    let n_sample = (ws.words.len() / 8).max(params.min_words);
    let mut agree = vec![0u32; ws.det_path.len()];
    for _ in 0..params.boot_iters {
        ws.sample.clear();
        for _ in 0..n_sample {
            ws.sample.push(ws.words[ws.lcg.below(ws.words.len())]);
        }
        descend(
            index,
            &ws.sample,
            Some(&mut ws.lcg),
            &mut ws.winners,
            &mut ws.boot_path,
        );

        // Consensus is monotone: a disagreement cuts off all deeper ranks.
        for (d, agree_d) in agree.iter_mut().enumerate() {
            if ws.boot_path.get(d) == ws.det_path.get(d) {
                *agree_d += 1;
            } else {
                break;
            }
        }
    }

    let probs = agree
        .iter()
        .map(|&a| a as f64 / params.boot_iters as f64)
        .collect();

    Some(StrandResult {
        path: ws.det_path.clone(),
        probs,
        score,
    })
}

/// Classifies one query against both strands. The deeper path wins; on
/// equal depth the higher log-likelihood wins; forward wins full ties.
pub fn classify(index: &NbcIndex, ws: &mut NbcWorkspace, seq: &[u8], params: &NbcParams) -> NbcHit {
    let fwd = classify_strand(index, ws, seq, false, params);
    let rev = classify_strand(index, ws, seq, true, params);

    let (strand, result) = match (fwd, rev) {
        (None, None) => return NbcHit::unclassified(),
        (Some(f), None) => ('+', f),
        (None, Some(r)) => ('-', r),
        (Some(f), Some(r)) => {
            let rev_wins = r.path.len() > f.path.len()
                || (r.path.len() == f.path.len() && r.score > f.score);
            if rev_wins {
                ('-', r)
            } else {
                ('+', f)
            }
        }
    };

    NbcHit {
        ranks: result
            .path
            .iter()
            .map(|&n| index.nodes[n].name.clone())
            .collect(),
        probs: result.probs,
        strand,
        score: result.score,
    }
}

/// Classifies a batch of queries, optionally in parallel; results are
/// index-aligned with `queries` and independent of the worker count.
pub fn classify_batch(
    index: &NbcIndex,
    queries: &[String],
    params: &NbcParams,
    threads: usize,
) -> Vec<NbcHit> {
    if threads == 1 {
        let mut ws = NbcWorkspace::new(index);
        return queries
            .iter()
            .map(|q| classify(index, &mut ws, q.as_bytes(), params))
            .collect();
    }

    queries
        .par_chunks(CHUNK)
        .map_init(
            || NbcWorkspace::new(index),
            |ws, chunk| {
                chunk
                    .iter()
                    .map(|q| classify(index, ws, q.as_bytes(), params))
                    .collect::<Vec<NbcHit>>()
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

    fn three_ref_index() -> NbcIndex {
        NbcIndex::build(
            &[REF1.to_string(), REF2.to_string(), REF3.to_string()],
            &[
                "d:Bacteria,p:Firmicutes,g:Testus".to_string(),
                "d:Bacteria,p:Proteobacteria,g:Probus".to_string(),
                "d:Archaea,p:Euryarchaeota,g:Archus".to_string(),
            ],
        )
    }

    #[test]
    fn test_tree_shape() {
        let index = three_ref_index();
        // root + 2 domains + 3 phyla + 3 genera
        assert_eq!(index.nodes.len(), 9);
        assert_eq!(index.n_refs(), 3);
        assert_eq!(index.nodes[ROOT].children.len(), 2);
    }

    #[test]
    fn test_self_classification_is_confident() {
        let index = three_ref_index();
        let mut ws = NbcWorkspace::new(&index);
        let hit = classify(&index, &mut ws, REF1.as_bytes(), &NbcParams::default());

        assert!(hit.ranks.len() > 2);
        assert_eq!(
            hit.ranks,
            vec!["d:Bacteria", "p:Firmicutes", "g:Testus"]
        );
        let n = hit.probs.len();
        assert!(hit.probs[n - 1] >= 0.9, "{:?}", hit.probs);
        assert!(hit.probs[n - 2] >= 0.9, "{:?}", hit.probs);
        assert_eq!(hit.strand, '+');
    }

    #[test]
    fn test_short_query_is_unclassified() {
        let index = three_ref_index();
        let mut ws = NbcWorkspace::new(&index);
        let hit = classify(&index, &mut ws, b"ACGTACG", &NbcParams::default());
        assert!(!hit.is_classified());
        assert_eq!(hit.score, f64::NEG_INFINITY);
    }

    #[test]
    fn test_reverse_complement_hits_minus_strand() {
        let index = three_ref_index();
        let mut ws = NbcWorkspace::new(&index);
        let rc = reverse_complement(REF2);
        let hit = classify(&index, &mut ws, rc.as_bytes(), &NbcParams::default());
        assert_eq!(hit.strand, '-');
        assert_eq!(hit.ranks.last().map(String::as_str), Some("g:Probus"));
    }

    #[test]
    fn test_shared_prefix_nodes_accumulate_counts() {
        let index = NbcIndex::build(
            &[REF1.to_string(), REF2.to_string()],
            &[
                "d:Bacteria,p:Firmicutes".to_string(),
                "d:Bacteria,p:Proteobacteria".to_string(),
            ],
        );
        // root + d:Bacteria + 2 phyla
        assert_eq!(index.nodes.len(), 4);
        let domain = index.nodes[ROOT].children[0];
        assert_eq!(index.nodes[domain].seq_count, 2);
    }

    #[test]
    fn test_empty_index_returns_unclassified() {
        let index = NbcIndex::build(&[], &[]);
        let mut ws = NbcWorkspace::new(&index);
        let hit = classify(&index, &mut ws, REF1.as_bytes(), &NbcParams::default());
        assert!(!hit.is_classified());
    }

    #[test]
    fn test_batch_matches_sequential() {
        let index = three_ref_index();
        let queries = vec![REF1.to_string(), REF3.to_string()];
        let seq_hits = classify_batch(&index, &queries, &NbcParams::default(), 1);
        let par_hits = classify_batch(&index, &queries, &NbcParams::default(), 2);
        for (a, b) in seq_hits.iter().zip(&par_hits) {
            assert_eq!(a.ranks, b.ranks);
            assert_eq!(a.probs, b.probs);
            assert_eq!(a.strand, b.strand);
        }
    }
}
