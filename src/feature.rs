use crate::error::{Result, SketchError};
use crate::range::Range;
use bio::io::gff;
use bio_types::strand::Strand as GffStrand;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
    #[default]
    Unknown,
}

/// One annotation record, owning its child records.
///
/// Parent/child links follow the GFF3 `ID`/`Parent` attributes; the stream
/// resolves them, so a node handed downstream is always the root of a
/// complete tree.
#[derive(Clone, Debug)]
pub struct FeatureNode {
    seqid: String,
    kind: String,
    range: Range,
    strand: Strand,
    source: String,
    id: Option<String>,
    name: Option<String>,
    parents: Vec<String>,
    children: Vec<FeatureNode>,
}

impl FeatureNode {
    pub fn new(seqid: &str, kind: &str, range: Range, strand: Strand) -> Self {
        Self {
            seqid: seqid.to_string(),
            kind: kind.to_string(),
            range,
            strand,
            source: String::new(),
            id: None,
            name: None,
            parents: vec![],
            children: vec![],
        }
    }

    pub fn from_gff(record: &gff::Record) -> Result<Self> {
        let start = record.start().to_owned();
        let end = record.end().to_owned();
        let range = Range::new(start, end).map_err(|_| {
            SketchError::Input(format!(
                "feature '{}' on '{}' has start {start} after end {end}",
                record.feature_type(),
                record.seqname()
            ))
        })?;
        let strand = match record.strand() {
            Some(GffStrand::Forward) => Strand::Forward,
            Some(GffStrand::Reverse) => Strand::Reverse,
            _ => Strand::Unknown,
        };
        // GFF3 allows one record to name several parents, comma-separated.
        let parents = record
            .attributes()
            .get_vec("Parent")
            .map(|values| {
                values
                    .iter()
                    .flat_map(|value| value.split(','))
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            seqid: record.seqname().to_string(),
            kind: record.feature_type().to_string(),
            range,
            strand,
            source: record.source().to_string(),
            id: record.attributes().get("ID").cloned(),
            name: record.attributes().get("Name").cloned(),
            parents,
            children: vec![],
        })
    }

    #[inline(always)]
    pub fn seqid(&self) -> &str {
        &self.seqid
    }

    #[inline(always)]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline(always)]
    pub fn range(&self) -> Range {
        self.range
    }

    #[inline(always)]
    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }

    pub fn set_id(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self) -> &[FeatureNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<FeatureNode> {
        &mut self.children
    }

    pub fn push_child(&mut self, child: FeatureNode) {
        self.children.push(child);
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Smallest range covering this node and every descendant.
    pub fn extent(&self) -> Range {
        let mut extent = self.range;
        for child in &self.children {
            extent = extent.join(&child.extent());
        }
        extent
    }

    /// Caption shown for this node in a diagram: `Name`, falling back to `ID`.
    pub fn caption(&self) -> Option<&str> {
        self.name.as_deref().or(self.id.as_deref())
    }
}
