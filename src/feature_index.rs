//! In-memory index of annotation records, keyed by sequence region.

use crate::error::{Result, SketchError};
use crate::feature::FeatureNode;
use crate::range::Range;
use crate::stream::FeatureStream;
use itertools::Itertools;
use log::debug;
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug)]
struct RegionBucket {
    features: Vec<FeatureNode>,
    /// Minimal range covering every record seen for this region, widened on
    /// each insertion.
    dyn_range: Range,
}

/// Append-only store of every feature tree observed so far.
///
/// Queries always reflect every record ingested before the call. Region
/// enumeration is lexicographic; only `first_seq_id` remembers ingestion
/// order.
#[derive(Clone, Debug, Default)]
pub struct FeatureIndex {
    regions: HashMap<String, RegionBucket>,
    first_seqid: Option<String>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest every record the stream yields. All-or-nothing: when the
    /// stream fails partway, the index is left exactly as before the call.
    pub fn add_stream(&mut self, mut stream: FeatureStream) -> Result<()> {
        let mut staged = Vec::new();
        while let Some(node) = stream.next_node()? {
            staged.push(node);
        }
        debug!("staged {} feature trees for the index", staged.len());
        for node in staged {
            self.insert(node);
        }
        Ok(())
    }

    /// Ingest a single GFF3 file without ordering assumptions.
    pub fn add_gff3_file(&mut self, path: &Path) -> Result<()> {
        self.add_stream(FeatureStream::unsorted(std::slice::from_ref(&path)))
    }

    /// Ingest several GFF3 files as one logical stream.
    pub fn add_gff3_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        self.add_stream(FeatureStream::unsorted(paths))
    }

    fn insert(&mut self, node: FeatureNode) {
        let extent = node.extent();
        let seqid = node.seqid().to_string();
        if self.first_seqid.is_none() {
            self.first_seqid = Some(seqid.clone());
        }
        match self.regions.get_mut(&seqid) {
            Some(bucket) => {
                bucket.dyn_range = bucket.dyn_range.join(&extent);
                bucket.features.push(node);
            }
            None => {
                self.regions.insert(
                    seqid,
                    RegionBucket {
                        features: vec![node],
                        dyn_range: extent,
                    },
                );
            }
        }
    }

    /// Sequence region of the first record ever added.
    pub fn first_seq_id(&self) -> Result<&str> {
        self.first_seqid.as_deref().ok_or(SketchError::EmptyIndex)
    }

    /// Every region identifier, lexicographically sorted. Fails on an index
    /// that never saw a record, so callers can tell "no data at all" apart
    /// from an empty query result.
    pub fn seq_ids(&self) -> Result<Vec<&str>> {
        if self.regions.is_empty() {
            return Err(SketchError::EmptyIndex);
        }
        Ok(self.regions.keys().map(String::as_str).sorted().collect())
    }

    pub fn has_seq_id(&self, seqid: &str) -> bool {
        self.regions.contains_key(seqid)
    }

    /// Minimal range covering every record under `seqid`.
    pub fn range_for(&self, seqid: &str) -> Result<Range> {
        self.regions
            .get(seqid)
            .map(|bucket| bucket.dyn_range)
            .ok_or_else(|| SketchError::UnknownSeqid(seqid.to_string()))
    }

    pub fn features_for(&self, seqid: &str) -> Result<&[FeatureNode]> {
        self.regions
            .get(seqid)
            .map(|bucket| bucket.features.as_slice())
            .ok_or_else(|| SketchError::UnknownSeqid(seqid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_file() {
        let mut index = FeatureIndex::new();
        // zero records is not an ingestion error
        index
            .add_gff3_file(Path::new("test_files/empty.gff3"))
            .unwrap();
        assert!(matches!(index.first_seq_id(), Err(SketchError::EmptyIndex)));
        assert!(matches!(index.seq_ids(), Err(SketchError::EmptyIndex)));
    }

    #[test]
    fn test_bounding_range_widens() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/overlap.gff3"))
            .unwrap();
        assert_eq!(
            index.range_for("chr1").unwrap(),
            Range::new(10, 30).unwrap()
        );
    }

    #[test]
    fn test_seq_ids_sorted_and_unique() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/eden.gff3"))
            .unwrap();
        index
            .add_gff3_file(Path::new("test_files/overlap.gff3"))
            .unwrap();
        let ids = index.seq_ids().unwrap();
        assert_eq!(ids, vec!["chr1", "ctg123", "ctg200"]);
        // every range the index reports satisfies start <= end by construction
        for id in ids {
            let range = index.range_for(id).unwrap();
            assert!(range.start() <= range.end());
        }
    }

    #[test]
    fn test_first_seq_id_spans_add_calls() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/eden.gff3"))
            .unwrap();
        index
            .add_gff3_file(Path::new("test_files/overlap.gff3"))
            .unwrap();
        assert_eq!(index.first_seq_id().unwrap(), "ctg123");
    }

    #[test]
    fn test_unknown_seqid() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/overlap.gff3"))
            .unwrap();
        assert!(matches!(
            index.range_for("chrMT"),
            Err(SketchError::UnknownSeqid(_))
        ));
        assert!(!index.has_seq_id("chrMT"));
        assert!(index.has_seq_id("chr1"));
    }

    #[test]
    fn test_failed_add_leaves_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partly_bad.gff3");
        std::fs::write(
            &path,
            "chr5\ttest\tgene\t10\t90\t.\t+\t.\tID=ok1\n\
             chr5\ttest\tgene\tnot_a_number\t95\t.\t+\t.\tID=bad1\n",
        )
        .unwrap();

        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/overlap.gff3"))
            .unwrap();
        assert!(index.add_gff3_file(&path).is_err());

        // the bad file contributed nothing at all
        assert_eq!(index.seq_ids().unwrap(), vec!["chr1"]);
        assert!(!index.has_seq_id("chr5"));
    }
}
