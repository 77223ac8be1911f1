//! Selection and grouping of indexed features for one region and range.

use crate::error::Result;
use crate::feature::{FeatureNode, Strand};
use crate::feature_index::FeatureIndex;
use crate::range::Range;
use crate::style::{ElementShape, Style};
use log::debug;

/// One drawable unit inside a block.
#[derive(Clone, Debug)]
pub struct Element {
    kind: String,
    range: Range,
    strand: Strand,
    shape: ElementShape,
    fill_color: String,
    stroke_color: String,
}

impl Element {
    fn from_node(node: &FeatureNode, style: &Style) -> Result<Self> {
        let rule = style.feature_rule(node.kind())?;
        Ok(Self {
            kind: node.kind().to_string(),
            range: node.range(),
            strand: node.strand(),
            shape: rule.style,
            fill_color: rule.fill_color.clone(),
            stroke_color: rule.stroke_color.clone(),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn shape(&self) -> ElementShape {
        self.shape
    }

    pub fn fill_color(&self) -> &str {
        &self.fill_color
    }

    pub fn stroke_color(&self) -> &str {
        &self.stroke_color
    }
}

/// A group of records rendered together: a feature plus every descendant
/// whose style collapses it into this group.
#[derive(Clone, Debug)]
pub struct Block {
    kind: String,
    range: Range,
    caption: Option<String>,
    strand: Strand,
    stroke_color: String,
    bar_height: f64,
    elements: Vec<Element>,
}

impl Block {
    fn from_node(node: &FeatureNode, style: &Style) -> Result<Self> {
        let element = Element::from_node(node, style)?;
        Ok(Self {
            kind: node.kind().to_string(),
            range: node.range(),
            caption: node.caption().map(str::to_string),
            strand: node.strand(),
            stroke_color: element.stroke_color.clone(),
            bar_height: style.bar_height_for(node.kind())?,
            elements: vec![element],
        })
    }

    fn push_element(&mut self, element: Element) {
        self.range = self.range.join(&element.range);
        self.elements.push(element);
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn stroke_color(&self) -> &str {
        &self.stroke_color
    }

    /// Row thickness resolved from the style at build time.
    pub fn bar_height(&self) -> f64 {
        self.bar_height
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
}

/// Immutable view of every block for one region overlapping one range,
/// with all style decisions already resolved.
#[derive(Clone, Debug)]
pub struct Diagram {
    seqid: String,
    range: Range,
    blocks: Vec<Block>,
}

impl Diagram {
    /// Select every feature tree under `seqid` overlapping `range` and
    /// group it according to `style`.
    pub fn build(
        index: &FeatureIndex,
        seqid: &str,
        range: Range,
        style: &Style,
    ) -> Result<Diagram> {
        let features = index.features_for(seqid)?;
        let mut blocks = Vec::new();
        for node in features {
            if !node.extent().overlaps(&range) {
                continue;
            }
            collect_blocks(node, style, &mut blocks)?;
        }
        blocks.sort_by(|a, b| {
            a.range
                .start()
                .cmp(&b.range.start())
                .then(a.range.end().cmp(&b.range.end()))
                .then(a.caption.cmp(&b.caption))
        });
        debug!(
            "diagram for '{seqid}' {}..{}: {} blocks",
            range.start(),
            range.end(),
            blocks.len()
        );
        Ok(Diagram {
            seqid: seqid.to_string(),
            range,
            blocks,
        })
    }

    pub fn seqid(&self) -> &str {
        &self.seqid
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub(crate) fn into_parts(self) -> (String, Range, Vec<Block>) {
        (self.seqid, self.range, self.blocks)
    }
}

/// Open a block for `node` and distribute its descendants between that block
/// and new blocks of their own, as the style dictates.
fn collect_blocks(node: &FeatureNode, style: &Style, out: &mut Vec<Block>) -> Result<()> {
    let mut block = Block::from_node(node, style)?;
    for child in node.children() {
        collect_into(child, style, &mut block, out)?;
    }
    out.push(block);
    Ok(())
}

fn collect_into(
    node: &FeatureNode,
    style: &Style,
    parent_block: &mut Block,
    out: &mut Vec<Block>,
) -> Result<()> {
    let rule = style.feature_rule(node.kind())?;
    if rule.collapse_to_parent {
        parent_block.push_element(Element::from_node(node, style)?);
        for child in node.children() {
            collect_into(child, style, parent_block, out)?;
        }
        Ok(())
    } else {
        collect_blocks(node, style, out)
    }
}
