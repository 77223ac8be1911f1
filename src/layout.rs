//! Row packing of diagram blocks for a target pixel width.

use crate::diagram::{Block, Diagram};
use crate::error::{Result, SketchError};
use crate::range::Range;
use crate::style::{FormatRules, Style};
use log::debug;

pub(crate) const CAPTION_HEIGHT: f64 = 10.0;
pub(crate) const TRACK_CAPTION_HEIGHT: f64 = 12.0;

/// A block with its pixel extent and assigned row.
#[derive(Clone, Debug)]
pub struct PositionedBlock {
    block: Block,
    x1: f64,
    x2: f64,
    /// Right edge of everything the block occupies, caption included.
    reach: f64,
    row: usize,
}

impl PositionedBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn reach(&self) -> f64 {
        self.reach
    }

    pub fn row(&self) -> usize {
        self.row
    }
}

/// All blocks of one feature type, packed into rows.
#[derive(Clone, Debug)]
pub struct Track {
    key: String,
    row_count: usize,
    blocks: Vec<PositionedBlock>,
}

impl Track {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn blocks(&self) -> &[PositionedBlock] {
        &self.blocks
    }

    pub fn blocks_in_row(&self, row: usize) -> impl Iterator<Item = &PositionedBlock> {
        self.blocks.iter().filter(move |pb| pb.row == row)
    }
}

/// Immutable arrangement of a diagram's blocks into non-colliding rows.
#[derive(Clone, Debug)]
pub struct Layout {
    seqid: String,
    range: Range,
    width: u32,
    format: FormatRules,
    tracks: Vec<Track>,
}

impl Layout {
    /// Arrange the diagram for `width` pixels. Blocks are grouped into one
    /// track per feature type; within a track each block goes to the first
    /// row whose last extent it clears, caption included.
    pub fn build(diagram: Diagram, width: u32, style: &Style) -> Result<Layout> {
        let format = style.format.clone();
        let usable = width as f64 - 2.0 * format.margins;
        if usable < 1.0 {
            return Err(SketchError::Input(format!(
                "image width {width} leaves no horizontal room inside the margins"
            )));
        }
        let (seqid, range, blocks) = diagram.into_parts();
        let mut layout = Layout {
            seqid,
            range,
            width,
            format,
            tracks: vec![],
        };

        let mut grouped: Vec<(String, Vec<Block>)> = Vec::new();
        for block in blocks {
            match grouped
                .iter_mut()
                .find(|(key, _)| key.as_str() == block.kind())
            {
                Some((_, list)) => list.push(block),
                None => grouped.push((block.kind().to_string(), vec![block])),
            }
        }

        for (key, mut list) in grouped {
            list.sort_by_key(|b| (b.range().start(), b.range().end()));
            let mut lane_ends: Vec<f64> = vec![];
            let mut placed = Vec::new();
            for block in list {
                let x1 = layout.x_for(block.range().start());
                let x2 = layout.x_for(block.range().end()).max(x1 + 1.0);
                let reach = match block.caption() {
                    Some(caption) if layout.format.show_block_captions => {
                        x2.max(x1 + estimate_text_width(caption))
                    }
                    _ => x2,
                };
                let row = lane_allocate(&mut lane_ends, x1, reach, layout.format.block_hpad);
                placed.push(PositionedBlock {
                    block,
                    x1,
                    x2,
                    reach,
                    row,
                });
            }
            debug!(
                "track '{key}': {} blocks packed into {} rows",
                placed.len(),
                lane_ends.len()
            );
            layout.tracks.push(Track {
                key,
                row_count: lane_ends.len(),
                blocks: placed,
            });
        }
        Ok(layout)
    }

    /// Pixel x for a sequence coordinate, clamped into the drawing area.
    pub fn x_for(&self, pos: u64) -> f64 {
        let left = self.format.margins;
        let right = self.width as f64 - self.format.margins;
        let frac = (pos as f64 - self.range.start() as f64) / self.range.len() as f64;
        (left + (right - left) * frac).clamp(left, right)
    }

    /// Total height implied by the rows and their style-derived thickness.
    pub fn height(&self) -> Result<f64> {
        let format = &self.format;
        let mut total = format.margins * 2.0 + format.ruler_space;
        for track in &self.tracks {
            if format.show_track_captions {
                total += TRACK_CAPTION_HEIGHT;
            }
            for row in 0..track.row_count {
                total += self.row_pitch(track, row)?;
            }
            total += format.track_vspace;
        }
        Ok(total)
    }

    /// Vertical room one row takes up, caption space and spacing included.
    pub(crate) fn row_pitch(&self, track: &Track, row: usize) -> Result<f64> {
        let caption_space = if self.format.show_block_captions {
            CAPTION_HEIGHT
        } else {
            0.0
        };
        Ok(caption_space + self.row_thickness(track, row)? + self.format.bar_vspace)
    }

    pub(crate) fn row_thickness(&self, track: &Track, row: usize) -> Result<f64> {
        let mut thickness: f64 = 0.0;
        for pb in track.blocks_in_row(row) {
            let bar_height = pb.block.bar_height();
            if bar_height <= 0.0 {
                return Err(SketchError::Style(format!(
                    "style for feature type '{}' yields a non-positive row height",
                    pb.block.kind()
                )));
            }
            thickness = thickness.max(bar_height);
        }
        Ok(thickness)
    }

    pub fn seqid(&self) -> &str {
        &self.seqid
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn format(&self) -> &FormatRules {
        &self.format
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

/// First-fit row allocation: reuse the first lane whose end the new extent
/// clears by `padding`, else open a new lane.
fn lane_allocate(lanes: &mut Vec<f64>, start: f64, end: f64, padding: f64) -> usize {
    for (idx, lane_end) in lanes.iter_mut().enumerate() {
        if start >= *lane_end + padding {
            *lane_end = end;
            return idx;
        }
    }
    lanes.push(end);
    lanes.len() - 1
}

fn estimate_text_width(label: &str) -> f64 {
    (label.chars().count().max(1) as f64) * 6.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_index::FeatureIndex;
    use std::path::Path;

    fn packing_layout(width: u32) -> Layout {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/packing.gff3"))
            .unwrap();
        let style = Style::builtin();
        let range = index.range_for("chr2").unwrap();
        let diagram = Diagram::build(&index, "chr2", range, &style).unwrap();
        Layout::build(diagram, width, &style).unwrap()
    }

    #[test]
    fn test_rows_never_overlap() {
        let layout = packing_layout(800);
        let track = &layout.tracks()[0];
        assert!(track.row_count() >= 2, "fixture must force several rows");
        for row in 0..track.row_count() {
            let mut row_blocks: Vec<_> = track.blocks_in_row(row).collect();
            row_blocks.sort_by(|a, b| a.x1().total_cmp(&b.x1()));
            for pair in row_blocks.windows(2) {
                assert!(
                    pair[1].x1() > pair[0].x2(),
                    "row {row} holds overlapping extents"
                );
            }
        }
    }

    #[test]
    fn test_every_block_is_placed() {
        let layout = packing_layout(800);
        let placed: usize = layout.tracks().iter().map(|t| t.blocks().len()).sum();
        assert_eq!(placed, 5);
    }

    #[test]
    fn test_height_is_idempotent() {
        let layout = packing_layout(800);
        let first = layout.height().unwrap();
        let second = layout.height().unwrap();
        assert_eq!(first, second);
        assert!(first > 0.0);
    }

    #[test]
    fn test_narrow_width_packs_more_rows() {
        let wide = packing_layout(2000);
        let narrow = packing_layout(120);
        assert!(narrow.tracks()[0].row_count() >= wide.tracks()[0].row_count());
    }

    #[test]
    fn test_zero_bar_height_fails_height() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/packing.gff3"))
            .unwrap();
        let mut style = Style::builtin();
        style.format.bar_height = 0.0;
        let range = index.range_for("chr2").unwrap();
        let diagram = Diagram::build(&index, "chr2", range, &style).unwrap();
        let layout = Layout::build(diagram, 800, &style).unwrap();
        assert!(matches!(layout.height(), Err(SketchError::Style(_))));
    }

    #[test]
    fn test_width_must_leave_room() {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/packing.gff3"))
            .unwrap();
        let style = Style::builtin();
        let range = index.range_for("chr2").unwrap();
        let diagram = Diagram::build(&index, "chr2", range, &style).unwrap();
        assert!(matches!(
            Layout::build(diagram, 10, &style),
            Err(SketchError::Input(_))
        ));
    }
}
