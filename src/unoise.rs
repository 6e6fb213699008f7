//! UNOISE3 Denoising
//!
//! Greedy abundance-ordered clustering (Edgar 2016): reads are dereplicated
//! upstream, sorted by abundance, and each sequence is either absorbed into
//! a more-abundant centroid within an abundance-dependent edit-distance
//! budget or promoted to a centroid of its own. Surviving centroids are
//! Zero-radius OTUs.

use crate::edit::bounded_edit_distance;

/// A sequence with its header-derived abundance.
#[derive(Debug, Clone)]
pub struct SeqRecord {
    pub id: String,
    pub seq: String,
    /// Abundance parsed from a `;size=N;` annotation (0 if absent).
    pub size: u64,
}

/// A denoised cluster seed.
#[derive(Debug, Clone)]
pub struct Centroid {
    /// The seeding sequence (most abundant member).
    pub record: SeqRecord,
    /// Summed abundance of every sequence merged into this centroid.
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct UnoiseParams {
    /// Skew-to-distance steepness; larger alpha admits fewer errors.
    pub alpha: f64,
    /// Minimum abundance for a sequence to seed its own centroid.
    pub min_size: u64,
}

impl Default for UnoiseParams {
    fn default() -> Self {
        Self {
            alpha: 2.0,
            min_size: 8,
        }
    }
}

/// Clusters `records` into centroids.
///
/// Input order does not matter; sequences are processed in descending
/// abundance. The returned list is sorted by `total_size` descending, ready
/// for chimera filtering.
pub fn denoise(mut records: Vec<SeqRecord>, params: &UnoiseParams) -> Vec<Centroid> {
    records.sort_by(|a, b| b.size.cmp(&a.size));

    let mut centroids: Vec<Centroid> = Vec::new();
    for rec in records {
        // Everything after this record is at most as abundant.
        if rec.size < params.min_size || rec.size == 0 {
            break;
        }

        let mut best: Option<(usize, usize)> = None;
        for (ci, c) in centroids.iter().enumerate() {
            // Centroids are seeded in descending abundance, so once the
            // skew drops below 2 the distance budget is negative for this
            // and every later centroid.
            if c.record.size < rec.size.saturating_mul(2) {
                break;
            }
            let skew = c.record.size as f64 / rec.size as f64;
            let max_diff = ((skew.log2() - 1.0) / params.alpha).floor() as usize;

            if rec.seq.len().abs_diff(c.record.seq.len()) > max_diff {
                continue;
            }
            let diff =
                bounded_edit_distance(rec.seq.as_bytes(), c.record.seq.as_bytes(), max_diff);
            if diff <= max_diff && best.map_or(true, |(_, d)| diff < d) {
                best = Some((ci, diff));
                if diff <= 1 {
                    break;
                }
            }
        }

        match best {
            Some((ci, _)) => centroids[ci].total_size += rec.size,
            None => {
                let size = rec.size;
                centroids.push(Centroid {
                    record: rec,
                    total_size: size,
                });
            }
        }
    }

    centroids.sort_by(|a, b| b.total_size.cmp(&a.total_size));
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, seq: &str, size: u64) -> SeqRecord {
        SeqRecord {
            id: id.to_string(),
            seq: seq.to_string(),
            size,
        }
    }

    const SEQ1: &str = "ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";
    const SEQ1_VAR: &str = "ACGTACGTACGTACGTACGAACGTACGTACGTACGTACGT";
    const SEQ2: &str = "TTGGCCAATTGGCCAATTGGCCAATTGGCCAATTGGCCAA";
    const SEQ2_VAR: &str = "TTGGCCAATTGGCCAATTGGACAATTGGCCAATTGGCCAA";

    #[test]
    fn test_error_variants_are_absorbed() {
        let records = vec![
            rec("a", SEQ1, 80),
            rec("b", SEQ1_VAR, 10),
            rec("c", SEQ2, 9),
            rec("d", SEQ2_VAR, 7),
        ];
        let centroids = denoise(records, &UnoiseParams::default());

        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].record.id, "a");
        assert_eq!(centroids[0].total_size, 90);
        assert_eq!(centroids[1].record.id, "c");
        assert_eq!(centroids[1].total_size, 9);
    }

    #[test]
    fn test_below_minsize_never_seeds() {
        let records = vec![rec("a", SEQ1, 100), rec("tiny", SEQ2, 3)];
        let centroids = denoise(records, &UnoiseParams::default());
        assert_eq!(centroids.len(), 1);
        assert_eq!(centroids[0].record.id, "a");
    }

    #[test]
    fn test_low_skew_keeps_separate_centroids() {
        // Sizes 100 and 90: skew < 2, so even a 1-edit variant seeds its own
        // centroid.
        let records = vec![rec("a", SEQ1, 100), rec("b", SEQ1_VAR, 90)];
        let centroids = denoise(records, &UnoiseParams::default());
        assert_eq!(centroids.len(), 2);
    }

    #[test]
    fn test_output_sorted_by_total_size() {
        // "c" seeds first (larger seed) but "a" overtakes it on total size
        // after absorbing its variant.
        let records = vec![
            rec("c", SEQ2, 85),
            rec("a", SEQ1, 80),
            rec("b", SEQ1_VAR, 10),
        ];
        let centroids = denoise(records, &UnoiseParams::default());
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].record.id, "a");
        assert_eq!(centroids[0].total_size, 90);
        assert_eq!(centroids[1].record.id, "c");
        assert_eq!(centroids[1].total_size, 85);
    }

    #[test]
    fn test_identical_sequence_merges_regardless_of_length_check() {
        let records = vec![rec("a", SEQ1, 400), rec("b", SEQ1, 10)];
        let centroids = denoise(records, &UnoiseParams::default());
        assert_eq!(centroids.len(), 1);
        assert_eq!(centroids[0].total_size, 410);
    }

    #[test]
    fn test_empty_input() {
        assert!(denoise(Vec::new(), &UnoiseParams::default()).is_empty());
    }
}
