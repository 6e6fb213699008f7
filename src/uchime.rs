//! UCHIME2-style de novo chimera detection.
//!
//! Each centroid is aligned against every sufficiently more abundant
//! centroid. Scanning the alignment paths from both ends locates how far the
//! query agrees with its best left-side parent and best right-side parent;
//! when those regions overlap or meet and belong to different parents, the
//! query is explained by a crossover and flagged chimeric.

use rayon::prelude::*;

use crate::align::{Alignment, BandedAligner, ALN_INF};
use crate::unoise::Centroid;

/// Queries dispatched per worker round-trip in parallel mode.
const CHUNK: usize = 32;

#[derive(Debug, Clone)]
pub struct UchimeParams {
    /// A parent must be at least this many times more abundant than the
    /// query to be considered.
    pub min_ab_skew: f64,
    /// 1 = sequential (evolving parent filter), 0 = all cores, N = fixed.
    pub threads: usize,
}

impl Default for UchimeParams {
    fn default() -> Self {
        Self {
            min_ab_skew: 16.0,
            threads: 1,
        }
    }
}

/// Positions of the first and second differences seen from each end of an
/// alignment path, in 1-based query coordinates.
struct DiffScan {
    pos_l0: usize,
    pos_l1: usize,
    pos_r0: usize,
    pos_r1: usize,
    diffs: usize,
}

fn scan_path(aln: &Alignment, query: &[u8], target: &[u8]) -> DiffScan {
    let qlen = query.len();
    let no_pos_r = qlen + 1;
    let mut scan = DiffScan {
        pos_l0: 0,
        pos_l1: 0,
        pos_r0: no_pos_r,
        pos_r1: no_pos_r,
        diffs: 0,
    };

    let mut qpos = 0usize;
    let mut tpos = 0usize;
    let mut seen = 0usize;
    for &op in &aln.path {
        let diff_at = match op {
            b'M' => {
                qpos += 1;
                tpos += 1;
                (query[qpos - 1] != target[tpos - 1]).then_some(qpos)
            }
            b'D' => {
                qpos += 1;
                Some(qpos)
            }
            _ => {
                tpos += 1;
                Some((qpos + 1).min(qlen.max(1)))
            }
        };
        if let Some(pos) = diff_at {
            scan.diffs += 1;
            match seen {
                0 => scan.pos_l0 = pos,
                1 => scan.pos_l1 = pos,
                _ => {}
            }
            seen += 1;
        }
    }

    let mut qpos = qlen;
    let mut tpos = target.len();
    let mut seen = 0usize;
    for &op in aln.path.iter().rev() {
        let diff_at = match op {
            b'M' => {
                let (qi, ti) = (qpos, tpos);
                qpos -= 1;
                tpos -= 1;
                (query[qi - 1] != target[ti - 1]).then_some(qi)
            }
            b'D' => {
                let qi = qpos;
                qpos -= 1;
                Some(qi)
            }
            _ => {
                tpos -= 1;
                Some(qpos.max(1))
            }
        };
        if let Some(pos) = diff_at {
            match seen {
                0 => scan.pos_r0 = pos,
                1 => scan.pos_r1 = pos,
                _ => {}
            }
            seen += 1;
            if seen >= 2 {
                break;
            }
        }
    }

    scan
}

/// Evaluates one query against its candidate parents.
///
/// `skip` carries the evolving flag array in sequential mode; parallel mode
/// passes `None` so every query sees the same parent pool regardless of
/// dispatch order.
fn query_is_chimera(
    qi: usize,
    centroids: &[Centroid],
    skip: Option<&[bool]>,
    min_ab_skew: f64,
    aligner: &mut BandedAligner,
) -> bool {
    let query = &centroids[qi];
    let qbytes = query.record.seq.as_bytes();
    let qlen = qbytes.len();
    let no_pos_r = qlen + 1;
    let threshold = (query.total_size as f64 * min_ab_skew).ceil() as u64;

    let mut pos_best_l0 = 0usize;
    let mut pos_best_l1 = 0usize;
    let mut pos_best_r0 = no_pos_r;
    let mut pos_best_r1 = no_pos_r;
    let (mut best_l0, mut best_l1) = (usize::MAX, usize::MAX);
    let (mut best_r0, mut best_r1) = (usize::MAX, usize::MAX);
    let mut best_parent_diffs = usize::MAX;
    let mut any_parent = false;

    for pj in 0..qi {
        // Centroids arrive sorted by total abundance, so the first parent
        // below the skew threshold ends the scan.
        if centroids[pj].total_size < threshold {
            break;
        }
        if let Some(flags) = skip {
            if flags[pj] {
                continue;
            }
        }

        let parent = centroids[pj].record.seq.as_bytes();
        let aln = aligner.global_align(qbytes, parent);
        if aln.score >= ALN_INF {
            continue;
        }

        let scan = scan_path(&aln, qbytes, parent);
        if scan.diffs == 0 {
            // Identical to a real parent: cannot be a chimera.
            return false;
        }
        any_parent = true;
        best_parent_diffs = best_parent_diffs.min(scan.diffs);

        if scan.pos_l0 > pos_best_l0 {
            pos_best_l0 = scan.pos_l0;
            best_l0 = pj;
        }
        if scan.pos_l1 > pos_best_l1 {
            pos_best_l1 = scan.pos_l1;
            best_l1 = pj;
        }
        if scan.pos_r0 < pos_best_r0 {
            pos_best_r0 = scan.pos_r0;
            best_r0 = pj;
        }
        if scan.pos_r1 < pos_best_r1 {
            pos_best_r1 = scan.pos_r1;
            best_r1 = pj;
        }
    }

    if !any_parent {
        return false;
    }

    let crossed = |pos_l: usize, pos_r: usize, left: usize, right: usize| {
        pos_l > 2 && pos_r != no_pos_r && pos_l + 1 >= pos_r && left != right
    };

    if crossed(pos_best_l0, pos_best_r0, best_l0, best_r0) {
        return true;
    }
    // Second-difference variants only fire when the query is clearly not a
    // near-copy of its closest parent.
    if best_parent_diffs > 4 {
        if crossed(pos_best_l1, pos_best_r0, best_l1, best_r0) {
            return true;
        }
        if crossed(pos_best_l0, pos_best_r1, best_l0, best_r1) {
            return true;
        }
    }
    false
}

/// Flags each centroid as chimeric or not.
///
/// `centroids` must be sorted by `total_size` descending (the order
/// [`crate::unoise::denoise`] returns). The result is index-aligned with the
/// input and, in parallel mode, identical for any worker count.
pub fn flag_chimeras(centroids: &[Centroid], params: &UchimeParams) -> Vec<bool> {
    if params.threads == 1 {
        let mut aligner = BandedAligner::new();
        let mut flags = vec![false; centroids.len()];
        for qi in 0..centroids.len() {
            let flag =
                query_is_chimera(qi, centroids, Some(&flags), params.min_ab_skew, &mut aligner);
            flags[qi] = flag;
        }
        return flags;
    }

    let indices: Vec<usize> = (0..centroids.len()).collect();
    indices
        .par_chunks(CHUNK)
        .map_init(BandedAligner::new, |aligner, chunk| {
            chunk
                .iter()
                .map(|&qi| query_is_chimera(qi, centroids, None, params.min_ab_skew, aligner))
                .collect::<Vec<bool>>()
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unoise::SeqRecord;

    fn centroid(id: &str, seq: &str, total_size: u64) -> Centroid {
        Centroid {
            record: SeqRecord {
                id: id.to_string(),
                seq: seq.to_string(),
                size: total_size,
            },
            total_size,
        }
    }

    fn half_and_half() -> Vec<Centroid> {
        let parent_a = "A".repeat(40);
        let parent_b = "T".repeat(40);
        let query = format!("{}{}", "A".repeat(20), "T".repeat(20));
        vec![
            centroid("a", &parent_a, 1000),
            centroid("b", &parent_b, 800),
            centroid("q", &query, 10),
        ]
    }

    #[test]
    fn test_exact_match_is_not_chimeric() {
        let seq = "ACGTACGTACGTACGTACGT";
        let centroids = vec![centroid("parent", seq, 200), centroid("query", seq, 10)];
        let flags = flag_chimeras(&centroids, &UchimeParams::default());
        assert_eq!(flags, vec![false, false]);
    }

    #[test]
    fn test_crossover_query_is_flagged() {
        let flags = flag_chimeras(&half_and_half(), &UchimeParams::default());
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_low_skew_parent_pool_is_empty() {
        // Parents are abundant but not 16x the query, so nothing qualifies.
        let centroids = {
            let mut c = half_and_half();
            c[2].total_size = 100;
            c
        };
        let flags = flag_chimeras(&centroids, &UchimeParams::default());
        assert_eq!(flags, vec![false, false, false]);
    }

    #[test]
    fn test_single_parent_cannot_explain_crossover() {
        let parent_a = "A".repeat(40);
        let query = format!("{}{}", "A".repeat(20), "T".repeat(20));
        let centroids = vec![centroid("a", &parent_a, 1000), centroid("q", &query, 10)];
        let flags = flag_chimeras(&centroids, &UchimeParams::default());
        assert_eq!(flags, vec![false, false]);
    }

    #[test]
    fn test_parallel_modes_match_each_other() {
        let centroids = half_and_half();
        let auto = flag_chimeras(
            &centroids,
            &UchimeParams {
                min_ab_skew: 16.0,
                threads: 0,
            },
        );
        let fixed = flag_chimeras(
            &centroids,
            &UchimeParams {
                min_ab_skew: 16.0,
                threads: 2,
            },
        );
        let again = flag_chimeras(
            &centroids,
            &UchimeParams {
                min_ab_skew: 16.0,
                threads: 0,
            },
        );
        assert_eq!(auto, vec![false, false, true]);
        assert_eq!(auto, fixed);
        assert_eq!(auto, again);
    }
}
