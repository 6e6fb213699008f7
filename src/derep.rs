//! Exact dereplication.
//!
//! Collapses identical reads (case-insensitive) into one record per
//! distinct sequence with a summed abundance, producing the size-annotated
//! input the denoiser expects. Reads that already carry a `;size=N;`
//! annotation contribute N instead of 1, so dereplicated files can be
//! merged and re-dereplicated.

use rustc_hash::FxHashMap;

use crate::labels;
use crate::unoise::SeqRecord;

/// Dereplicates `(id, seq)` pairs into abundance-sorted records.
///
/// The first-seen id names each cluster (existing size annotations are
/// stripped); output is sorted by size descending, first-seen order on
/// ties. Records below `min_size` are dropped.
pub fn dereplicate(
    reads: impl IntoIterator<Item = (String, String)>,
    min_size: u64,
) -> Vec<SeqRecord> {
    let mut by_seq: FxHashMap<String, usize> = FxHashMap::default();
    let mut records: Vec<SeqRecord> = Vec::new();

    for (id, seq) in reads {
        let count = labels::parse_size(&id).max(1);
        let key = seq.to_ascii_uppercase();
        match by_seq.get(&key) {
            Some(&idx) => records[idx].size += count,
            None => {
                by_seq.insert(key, records.len());
                records.push(SeqRecord {
                    id: labels::strip_size(&id),
                    seq,
                    size: count,
                });
            }
        }
    }

    records.sort_by(|a, b| b.size.cmp(&a.size));
    records.retain(|r| r.size >= min_size);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(id, seq)| (id.to_string(), seq.to_string()))
            .collect()
    }

    #[test]
    fn test_identical_reads_collapse() {
        let recs = dereplicate(
            reads(&[
                ("r1", "ACGTACGT"),
                ("r2", "ACGTACGT"),
                ("r3", "TTTTAAAA"),
            ]),
            0,
        );
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id, "r1");
        assert_eq!(recs[0].size, 2);
        assert_eq!(recs[1].size, 1);
    }

    #[test]
    fn test_case_insensitive_identity_keeps_first_spelling() {
        let recs = dereplicate(reads(&[("r1", "acgtACGT"), ("r2", "ACGTACGT")]), 0);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seq, "acgtACGT");
        assert_eq!(recs[0].size, 2);
    }

    #[test]
    fn test_existing_sizes_are_summed() {
        let recs = dereplicate(
            reads(&[("a;size=10;", "ACGT"), ("b;size=5;", "ACGT")]),
            0,
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, "a");
        assert_eq!(recs[0].size, 15);
    }

    #[test]
    fn test_min_size_floor() {
        let recs = dereplicate(
            reads(&[("a", "ACGT"), ("b", "ACGT"), ("c", "GGGG")]),
            2,
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].seq, "ACGT");
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let recs = dereplicate(reads(&[("x", "AAAA"), ("y", "CCCC")]), 0);
        assert_eq!(recs[0].id, "x");
        assert_eq!(recs[1].id, "y");
    }
}
