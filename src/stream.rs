//! Pull streams of annotation records over one or more GFF3 sources.

use crate::error::{Result, SketchError};
use crate::feature::FeatureNode;
use crate::range::Range;
use bio::io::gff;
use flate2::read::MultiGzDecoder;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Pull stream of complete feature trees.
///
/// `next_node` yields `Ok(Some(..))` per tree, `Ok(None)` at end of stream
/// (repeatable), and `Err` on failure. After a failure the stream is
/// poisoned; every further call fails.
///
/// Sorted mode assumes the source is ordered by sequence region and start
/// coordinate and keeps only the currently open trees in memory. Unsorted
/// mode buffers the whole input before emitting anything. An empty source
/// list reads from standard input.
pub struct FeatureStream {
    sources: Vec<PathBuf>,
    sorted: bool,
    add_introns: bool,
    poisoned: bool,
    done: bool,
    ready: VecDeque<FeatureNode>,
    // sorted-mode state
    reader: Option<gff::Reader<Box<dyn Read>>>,
    current_source: String,
    open: Vec<FeatureNode>,
    current_seqid: Option<String>,
    seen_seqids: HashSet<String>,
    last_start: u64,
    records_read: usize,
}

impl FeatureStream {
    /// Stream over a source that is guaranteed sorted. `None` reads stdin.
    pub fn sorted(path: Option<&Path>) -> Self {
        let sources = path.map(|p| vec![p.to_path_buf()]).unwrap_or_default();
        Self::new(sources, true)
    }

    /// Stream over one or more sources in the given order, with no ordering
    /// guarantee. An empty slice reads stdin.
    pub fn unsorted<P: AsRef<Path>>(paths: &[P]) -> Self {
        let sources = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        Self::new(sources, false)
    }

    /// Synthesize `intron` features between consecutive exons before emission.
    pub fn with_introns(mut self) -> Self {
        self.add_introns = true;
        self
    }

    fn new(sources: Vec<PathBuf>, sorted: bool) -> Self {
        Self {
            sources,
            sorted,
            add_introns: false,
            poisoned: false,
            done: false,
            ready: VecDeque::new(),
            reader: None,
            current_source: String::new(),
            open: vec![],
            current_seqid: None,
            seen_seqids: HashSet::new(),
            last_start: 0,
            records_read: 0,
        }
    }

    pub fn next_node(&mut self) -> Result<Option<FeatureNode>> {
        if self.poisoned {
            return Err(SketchError::Input(
                "annotation stream has already failed".to_string(),
            ));
        }
        loop {
            if let Some(mut node) = self.ready.pop_front() {
                if self.add_introns {
                    insert_introns(&mut node);
                }
                return Ok(Some(node));
            }
            if self.done {
                return Ok(None);
            }
            let step = if self.sorted {
                self.step_sorted()
            } else {
                self.ingest_unsorted()
            };
            if let Err(e) = step {
                self.poisoned = true;
                return Err(e);
            }
        }
    }

    /// Read one record in sorted mode, flushing trees that can no longer
    /// receive children.
    fn step_sorted(&mut self) -> Result<()> {
        if self.reader.is_none() {
            let path = self.sources.first().cloned().unwrap_or_default();
            self.current_source = display_name(&path);
            self.reader = Some(open_gff_reader(&path)?);
        }
        let next = match self.reader.as_mut() {
            Some(reader) => reader.records().next(),
            None => None,
        };
        match next {
            None => {
                debug!(
                    "{}: {} records read (sorted)",
                    self.current_source, self.records_read
                );
                self.flush_all_open();
                self.done = true;
                Ok(())
            }
            Some(Err(e)) => Err(SketchError::Input(format!(
                "{}: malformed annotation record: {e}",
                self.current_source
            ))),
            Some(Ok(record)) => {
                self.records_read += 1;
                let node = FeatureNode::from_gff(&record)?;
                self.take_sorted(node)
            }
        }
    }

    fn take_sorted(&mut self, node: FeatureNode) -> Result<()> {
        if !node.is_root() {
            return self.attach_open(node);
        }
        let seqid = node.seqid().to_string();
        let same_region = self.current_seqid.as_deref() == Some(seqid.as_str());
        if same_region {
            if node.range().start() < self.last_start {
                return Err(SketchError::Input(format!(
                    "{}: input is not sorted: position {} on '{seqid}' after position {}",
                    self.current_source,
                    node.range().start(),
                    self.last_start
                )));
            }
            self.flush_open_before(node.range().start());
        } else {
            if self.seen_seqids.contains(&seqid) {
                return Err(SketchError::Input(format!(
                    "{}: input is not sorted: sequence region '{seqid}' appears in more \
                     than one run",
                    self.current_source
                )));
            }
            self.flush_all_open();
            self.seen_seqids.insert(seqid.clone());
            self.current_seqid = Some(seqid);
        }
        self.last_start = node.range().start();
        self.open.push(node);
        Ok(())
    }

    fn attach_open(&mut self, node: FeatureNode) -> Result<()> {
        let parent_id = node.parents()[0].clone();
        let mut path = Vec::new();
        if !find_path(&self.open, &parent_id, &mut path) {
            return Err(SketchError::Input(format!(
                "{}: feature on '{}' references Parent '{parent_id}' which is not part of \
                 any open feature (is the input really sorted?)",
                self.current_source,
                node.seqid()
            )));
        }
        attach_at(&mut self.open, &path, node);
        Ok(())
    }

    /// Move every open tree that ends before `start` to the ready queue.
    fn flush_open_before(&mut self, start: u64) {
        let mut i = 0;
        while i < self.open.len() {
            if self.open[i].extent().end() < start {
                let node = self.open.remove(i);
                self.ready.push_back(node);
            } else {
                i += 1;
            }
        }
    }

    fn flush_all_open(&mut self) {
        self.ready.extend(self.open.drain(..));
    }

    /// Unsorted mode: buffer every source completely, link children to
    /// parents across the whole input, then queue the root trees grouped per
    /// sequence region (regions in first-encountered order, trees sorted by
    /// coordinate within each region).
    fn ingest_unsorted(&mut self) -> Result<()> {
        let mut raw: Vec<Option<FeatureNode>> = Vec::new();
        let mut ids: HashMap<String, usize> = HashMap::new();
        let mut seqid_order: Vec<String> = Vec::new();

        let sources = if self.sources.is_empty() {
            vec![PathBuf::new()]
        } else {
            self.sources.clone()
        };
        for path in &sources {
            let name = display_name(path);
            let mut reader = open_gff_reader(path)?;
            let mut count = 0usize;
            for record in reader.records() {
                let record = record.map_err(|e| {
                    SketchError::Input(format!("{name}: malformed annotation record: {e}"))
                })?;
                let node = FeatureNode::from_gff(&record)?;
                if !seqid_order.iter().any(|s| s == node.seqid()) {
                    seqid_order.push(node.seqid().to_string());
                }
                if let Some(id) = node.id() {
                    ids.entry(id.to_string()).or_insert(raw.len());
                }
                raw.push(Some(node));
                count += 1;
            }
            debug!("{name}: {count} records read (unsorted)");
        }

        // Attach children deepest-first, so a node is complete before it is
        // moved into its parent.
        let mut order: Vec<(usize, usize)> = Vec::new();
        for idx in 0..raw.len() {
            order.push((chain_depth(&raw, &ids, idx)?, idx));
        }
        order.sort_by(|a, b| b.0.cmp(&a.0));
        for (depth, idx) in order {
            if depth == 0 {
                continue;
            }
            let parent_id = match raw[idx].as_ref().and_then(|n| n.parents().first()) {
                Some(id) => id.clone(),
                None => continue,
            };
            let child = match raw[idx].take() {
                Some(child) => child,
                None => continue,
            };
            let parent_idx = ids[&parent_id];
            raw[parent_idx]
                .as_mut()
                .expect("parents are attached after their children")
                .push_child(child);
        }

        let mut buckets: HashMap<String, Vec<FeatureNode>> = HashMap::new();
        for node in raw.into_iter().flatten() {
            buckets.entry(node.seqid().to_string()).or_default().push(node);
        }
        for seqid in &seqid_order {
            if let Some(mut nodes) = buckets.remove(seqid) {
                nodes.sort_by_key(|n| (n.range().start(), n.range().end()));
                self.ready.extend(nodes);
            }
        }
        self.done = true;
        Ok(())
    }
}

/// Length of the parent chain above `idx`; fails on undefined or circular
/// `Parent` references.
fn chain_depth(
    raw: &[Option<FeatureNode>],
    ids: &HashMap<String, usize>,
    idx: usize,
) -> Result<usize> {
    let mut depth = 0usize;
    let mut cursor = idx;
    loop {
        let node = match raw[cursor].as_ref() {
            Some(node) => node,
            None => return Ok(depth),
        };
        let Some(parent_id) = node.parents().first() else {
            return Ok(depth);
        };
        let parent_idx = ids.get(parent_id).copied().ok_or_else(|| {
            SketchError::Input(format!(
                "feature on '{}' references Parent '{parent_id}' which was not defined",
                node.seqid()
            ))
        })?;
        depth += 1;
        cursor = parent_idx;
        if depth > raw.len() {
            return Err(SketchError::Input(format!(
                "circular Parent reference involving '{parent_id}'"
            )));
        }
    }
}

/// Append `child` to the node a `find_path` result points at.
fn attach_at(nodes: &mut [FeatureNode], path: &[usize], child: FeatureNode) {
    if path.len() == 1 {
        nodes[path[0]].push_child(child);
    } else {
        attach_at(nodes[path[0]].children_mut(), &path[1..], child);
    }
}

/// Depth-first search for a node id; on success `path` holds the child
/// indices leading to it.
fn find_path(nodes: &[FeatureNode], id: &str, path: &mut Vec<usize>) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        path.push(i);
        if node.id() == Some(id) {
            return true;
        }
        if find_path(node.children(), id, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Insert `intron` features into the gaps between consecutive exon children,
/// the whole tree deep.
pub(crate) fn insert_introns(node: &mut FeatureNode) {
    for child in node.children_mut().iter_mut() {
        insert_introns(child);
    }
    let mut exons: Vec<FeatureNode> = node
        .children()
        .iter()
        .filter(|c| c.kind() == "exon")
        .cloned()
        .collect();
    if exons.len() < 2 {
        return;
    }
    exons.sort_by_key(|exon| exon.range().start());
    let seqid = node.seqid().to_string();
    let mut introns = Vec::new();
    for pair in exons.windows(2) {
        let prev = pair[0].range();
        let next = pair[1].range();
        if next.start() > prev.end() + 1 {
            if let Ok(range) = Range::new(prev.end() + 1, next.start() - 1) {
                let mut intron = FeatureNode::new(&seqid, "intron", range, pair[0].strand());
                intron.set_source(pair[0].source());
                introns.push(intron);
            }
        }
    }
    if introns.is_empty() {
        return;
    }
    node.children_mut().extend(introns);
    node.children_mut().sort_by_key(|c| c.range().start());
}

fn display_name(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}

fn open_gff_reader(path: &Path) -> Result<gff::Reader<Box<dyn Read>>> {
    let read: Box<dyn Read> = if path.as_os_str().is_empty() {
        Box::new(io::stdin())
    } else {
        let file = File::open(path)
            .map_err(|e| SketchError::Input(format!("cannot open '{}': {e}", path.display())))?;
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz")) {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        }
    };
    Ok(gff::Reader::new(read, gff::GffType::GFF3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Strand;
    use std::io::Write;

    fn drain(mut stream: FeatureStream) -> Vec<FeatureNode> {
        let mut nodes = vec![];
        while let Some(node) = stream.next_node().unwrap() {
            nodes.push(node);
        }
        // end of stream is repeatable
        assert!(stream.next_node().unwrap().is_none());
        nodes
    }

    #[test]
    fn test_sorted_single_file() {
        let stream = FeatureStream::sorted(Some(Path::new("test_files/eden.gff3")));
        let nodes = drain(stream);
        assert_eq!(nodes.len(), 2);

        let gene = &nodes[0];
        assert_eq!(gene.kind(), "gene");
        assert_eq!(gene.seqid(), "ctg123");
        assert_eq!(gene.name(), Some("EDEN"));
        // TF_binding_site plus one mRNA
        assert_eq!(gene.children().len(), 2);
        let mrna = gene
            .children()
            .iter()
            .find(|c| c.kind() == "mRNA")
            .unwrap();
        assert_eq!(mrna.children().iter().filter(|c| c.kind() == "exon").count(), 4);

        assert_eq!(nodes[1].kind(), "gene");
        assert_eq!(nodes[1].seqid(), "ctg200");
    }

    #[test]
    fn test_unsorted_multiple_files_regroup() {
        let stream = FeatureStream::unsorted(&[
            "test_files/unsorted_a.gff3",
            "test_files/unsorted_b.gff3",
        ]);
        let nodes = drain(stream);
        assert_eq!(nodes.len(), 2);

        // The second file holds the earliest record; it still comes out first.
        assert_eq!(nodes[0].id(), Some("gene0"));
        assert_eq!(nodes[0].range().start(), 100);

        // Children from both files end up under the one parent.
        let gene = &nodes[1];
        assert_eq!(gene.id(), Some("gene1"));
        let mrna = &gene.children()[0];
        assert_eq!(mrna.children().iter().filter(|c| c.kind() == "exon").count(), 2);
    }

    #[test]
    fn test_unsorted_undefined_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.gff3");
        std::fs::write(
            &path,
            "chr1\ttest\texon\t10\t20\t.\t+\t.\tID=e1;Parent=nowhere\n",
        )
        .unwrap();
        let mut stream = FeatureStream::unsorted(&[&path]);
        let err = stream.next_node().unwrap_err();
        assert!(err.to_string().contains("nowhere"));
        // poisoned from here on
        assert!(stream.next_node().is_err());
    }

    #[test]
    fn test_sorted_detects_unsorted_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unsorted.gff3");
        std::fs::write(
            &path,
            "chr1\ttest\tgene\t500\t900\t.\t+\t.\tID=g1\n\
             chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=g2\n",
        )
        .unwrap();
        let mut stream = FeatureStream::sorted(Some(path.as_path()));
        let first = stream.next_node();
        let second = stream.next_node();
        let failed = first.is_err() || second.is_err();
        assert!(failed, "out-of-order input must fail the stream");
    }

    #[test]
    fn test_gzip_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gff3.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder
            .write_all(b"chr9\ttest\tgene\t10\t99\t.\t+\t.\tID=g1\n")
            .unwrap();
        encoder.finish().unwrap();

        let nodes = drain(FeatureStream::unsorted(&[&path]));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].seqid(), "chr9");
    }

    #[test]
    fn test_missing_file_fails() {
        let mut stream = FeatureStream::unsorted(&["test_files/does_not_exist.gff3"]);
        assert!(stream.next_node().is_err());
    }

    #[test]
    fn test_insert_introns() {
        let mut mrna = FeatureNode::new(
            "chr1",
            "mRNA",
            Range::new(1000, 5000).unwrap(),
            Strand::Forward,
        );
        mrna.push_child(FeatureNode::new(
            "chr1",
            "exon",
            Range::new(1000, 2000).unwrap(),
            Strand::Forward,
        ));
        mrna.push_child(FeatureNode::new(
            "chr1",
            "exon",
            Range::new(3000, 5000).unwrap(),
            Strand::Forward,
        ));
        insert_introns(&mut mrna);
        let introns: Vec<_> = mrna
            .children()
            .iter()
            .filter(|c| c.kind() == "intron")
            .collect();
        assert_eq!(introns.len(), 1);
        assert_eq!(introns[0].range(), Range::new(2001, 2999).unwrap());

        // adjacent exons leave no gap
        let mut tight = FeatureNode::new(
            "chr1",
            "mRNA",
            Range::new(1, 20).unwrap(),
            Strand::Forward,
        );
        tight.push_child(FeatureNode::new(
            "chr1",
            "exon",
            Range::new(1, 10).unwrap(),
            Strand::Forward,
        ));
        tight.push_child(FeatureNode::new(
            "chr1",
            "exon",
            Range::new(11, 20).unwrap(),
            Strand::Forward,
        ));
        insert_introns(&mut tight);
        assert!(tight.children().iter().all(|c| c.kind() != "intron"));
    }
}
