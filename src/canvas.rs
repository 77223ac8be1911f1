//! Committing a layout to an output image.

use crate::diagram::Element;
use crate::error::{Result, SketchError};
use crate::feature::Strand;
use crate::layout::{Layout, CAPTION_HEIGHT, TRACK_CAPTION_HEIGHT};
use crate::style::ElementShape;
use log::debug;
use std::fs;
use std::path::Path;
use svg::node::element::path::Data;
use svg::node::element::{Line, Path as SvgPath, Rectangle, Text};
use svg::Document;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "png" => Ok(OutputFormat::Png),
            "svg" => Ok(OutputFormat::Svg),
            _ => Err(SketchError::Input(format!(
                "unknown output format '{name}' (choose from png|svg)"
            ))),
        }
    }
}

/// A single-use rendering surface.
///
/// Once written, a canvas must not be sketched onto or written again; both
/// are reported as render errors.
pub trait Canvas {
    fn sketch(&mut self, layout: &Layout) -> Result<()>;
    fn write(&mut self, destination: &Path) -> Result<()>;
}

/// Canvas that accumulates an SVG document and rasterizes it on write.
pub struct ImageCanvas {
    format: OutputFormat,
    width: u32,
    height: u32,
    document: Document,
    sketched: bool,
    written: bool,
}

impl ImageCanvas {
    pub fn new(format: OutputFormat, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SketchError::Render(format!(
                "cannot create a {width}x{height} canvas"
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            document: Document::new(),
            sketched: false,
            written: false,
        })
    }

    fn draw_ruler(&self, mut doc: Document, layout: &Layout) -> Document {
        let format = layout.format();
        let left = format.margins;
        let right = self.width as f64 - format.margins;
        let base_y = format.margins + format.ruler_space - 6.0;

        doc = doc.add(
            Line::new()
                .set("x1", left)
                .set("y1", base_y)
                .set("x2", right)
                .set("y2", base_y)
                .set("stroke", "#000000")
                .set("stroke-width", 1),
        );

        let range = layout.range();
        let mut tick: u64 = 1;
        while tick * 10 < range.len() {
            tick *= 10;
        }
        let mut pos = range.start().div_ceil(tick) * tick;
        while pos <= range.end() {
            let x = layout.x_for(pos);
            doc = doc.add(
                Line::new()
                    .set("x1", x)
                    .set("y1", base_y)
                    .set("x2", x)
                    .set("y2", base_y + 4.0)
                    .set("stroke", "#000000")
                    .set("stroke-width", 1),
            );
            doc = doc.add(
                Text::new(format!("{pos}"))
                    .set("x", x)
                    .set("y", base_y - 2.0)
                    .set("text-anchor", "middle")
                    .set("font-family", "monospace")
                    .set("font-size", 8)
                    .set("fill", "#111111"),
            );
            pos += tick;
        }
        doc
    }

    fn draw_element(
        &self,
        mut doc: Document,
        layout: &Layout,
        element: &Element,
        bar_y: f64,
        thickness: f64,
        block_height: f64,
    ) -> Document {
        let x1 = layout.x_for(element.range().start());
        let x2 = layout.x_for(element.range().end()).max(x1 + 1.0);
        let height = block_height.min(thickness);
        let y = bar_y + (thickness - height) / 2.0;

        match element.shape() {
            ElementShape::Line => {
                doc = doc.add(
                    Line::new()
                        .set("x1", x1)
                        .set("y1", y + height / 2.0)
                        .set("x2", x2)
                        .set("y2", y + height / 2.0)
                        .set("stroke", element.stroke_color())
                        .set("stroke-width", 1),
                );
            }
            ElementShape::Box => match element.strand() {
                Strand::Forward | Strand::Reverse => {
                    let tip = (height * 0.6).min(x2 - x1);
                    let data = if element.strand() == Strand::Forward {
                        Data::new()
                            .move_to((x1, y))
                            .line_to((x2 - tip, y))
                            .line_to((x2, y + height / 2.0))
                            .line_to((x2 - tip, y + height))
                            .line_to((x1, y + height))
                            .close()
                    } else {
                        Data::new()
                            .move_to((x2, y))
                            .line_to((x1 + tip, y))
                            .line_to((x1, y + height / 2.0))
                            .line_to((x1 + tip, y + height))
                            .line_to((x2, y + height))
                            .close()
                    };
                    doc = doc.add(
                        SvgPath::new()
                            .set("d", data)
                            .set("fill", element.fill_color())
                            .set("stroke", element.stroke_color())
                            .set("stroke-width", 1),
                    );
                }
                Strand::Unknown => {
                    doc = doc.add(
                        Rectangle::new()
                            .set("x", x1)
                            .set("y", y)
                            .set("width", x2 - x1)
                            .set("height", height)
                            .set("fill", element.fill_color())
                            .set("stroke", element.stroke_color())
                            .set("stroke-width", 1),
                    );
                }
            },
        }
        doc
    }
}

impl Canvas for ImageCanvas {
    fn sketch(&mut self, layout: &Layout) -> Result<()> {
        if self.written {
            return Err(SketchError::Render(
                "canvas has already been written; a canvas is single-use".to_string(),
            ));
        }
        let format = layout.format();
        let mut doc = Document::new()
            .set("viewBox", (0, 0, self.width, self.height))
            .set("width", self.width)
            .set("height", self.height)
            .add(
                Rectangle::new()
                    .set("x", 0)
                    .set("y", 0)
                    .set("width", self.width)
                    .set("height", self.height)
                    .set("fill", format.background_color.as_str()),
            );

        doc = self.draw_ruler(doc, layout);

        let mut y = format.margins + format.ruler_space;
        for track in layout.tracks() {
            if format.show_track_captions {
                doc = doc.add(
                    Text::new(track.key().to_string())
                        .set("x", format.margins)
                        .set("y", y + TRACK_CAPTION_HEIGHT - 3.0)
                        .set("font-family", "monospace")
                        .set("font-size", 10)
                        .set("fill", "#333333"),
                );
                y += TRACK_CAPTION_HEIGHT;
            }
            for row in 0..track.row_count() {
                let thickness = layout.row_thickness(track, row)?;
                let caption_space = if format.show_block_captions {
                    CAPTION_HEIGHT
                } else {
                    0.0
                };
                let bar_y = y + caption_space;
                for pb in track.blocks_in_row(row) {
                    let block = pb.block();
                    if format.show_block_captions {
                        if let Some(caption) = block.caption() {
                            doc = doc.add(
                                Text::new(caption.to_string())
                                    .set("x", pb.x1())
                                    .set("y", bar_y - 2.0)
                                    .set("font-family", "monospace")
                                    .set("font-size", 8)
                                    .set("fill", "#111111"),
                            );
                        }
                    }
                    // connector under multi-element blocks
                    if block.elements().len() > 1 {
                        doc = doc.add(
                            Line::new()
                                .set("x1", pb.x1())
                                .set("y1", bar_y + thickness / 2.0)
                                .set("x2", pb.x2())
                                .set("y2", bar_y + thickness / 2.0)
                                .set("stroke", block.stroke_color())
                                .set("stroke-width", 1),
                        );
                    }
                    for element in block.elements() {
                        doc = self.draw_element(
                            doc,
                            layout,
                            element,
                            bar_y,
                            thickness,
                            block.bar_height(),
                        );
                    }
                }
                y += caption_space + thickness + format.bar_vspace;
            }
            y += format.track_vspace;
        }

        self.document = doc;
        self.sketched = true;
        Ok(())
    }

    fn write(&mut self, destination: &Path) -> Result<()> {
        if self.written {
            return Err(SketchError::Render(
                "canvas has already been written; a canvas is single-use".to_string(),
            ));
        }
        if !self.sketched {
            return Err(SketchError::Render(
                "nothing has been sketched onto this canvas".to_string(),
            ));
        }
        let data = self.document.to_string();
        match self.format {
            OutputFormat::Svg => {
                fs::write(destination, data.as_bytes()).map_err(|e| {
                    SketchError::Render(format!(
                        "cannot write '{}': {e}",
                        destination.display()
                    ))
                })?;
            }
            OutputFormat::Png => {
                let mut options = resvg::usvg::Options::default();
                options.fontdb_mut().load_system_fonts();
                let tree = resvg::usvg::Tree::from_str(&data, &options).map_err(|e| {
                    SketchError::Render(format!("cannot prepare raster image: {e}"))
                })?;
                let mut pixmap = resvg::tiny_skia::Pixmap::new(self.width, self.height)
                    .ok_or_else(|| {
                        SketchError::Render(format!(
                            "cannot allocate a {}x{} pixel buffer",
                            self.width, self.height
                        ))
                    })?;
                resvg::render(
                    &tree,
                    resvg::tiny_skia::Transform::identity(),
                    &mut pixmap.as_mut(),
                );
                pixmap.save_png(destination).map_err(|e| {
                    SketchError::Render(format!(
                        "cannot write '{}': {e}",
                        destination.display()
                    ))
                })?;
            }
        }
        debug!(
            "wrote {} ({}x{} px)",
            destination.display(),
            self.width,
            self.height
        );
        self.written = true;
        Ok(())
    }
}

/// Renderer stub for pipelines configured without image output. Keeps the
/// single-use contract, produces nothing.
#[derive(Debug, Default)]
pub struct NullCanvas {
    written: bool,
}

impl NullCanvas {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Canvas for NullCanvas {
    fn sketch(&mut self, _layout: &Layout) -> Result<()> {
        if self.written {
            return Err(SketchError::Render(
                "canvas has already been written; a canvas is single-use".to_string(),
            ));
        }
        Ok(())
    }

    fn write(&mut self, _destination: &Path) -> Result<()> {
        if self.written {
            return Err(SketchError::Render(
                "canvas has already been written; a canvas is single-use".to_string(),
            ));
        }
        self.written = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::Diagram;
    use crate::feature_index::FeatureIndex;
    use crate::style::Style;

    fn small_layout() -> Layout {
        let mut index = FeatureIndex::new();
        index
            .add_gff3_file(Path::new("test_files/packing.gff3"))
            .unwrap();
        let style = Style::builtin();
        let range = index.range_for("chr2").unwrap();
        let diagram = Diagram::build(&index, "chr2", range, &style).unwrap();
        Layout::build(diagram, 400, &style).unwrap()
    }

    #[test]
    fn test_png_canvas_is_single_use() {
        let layout = small_layout();
        let height = layout.height().unwrap().ceil() as u32;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sketch.png");

        let mut canvas = ImageCanvas::new(OutputFormat::Png, 400, height).unwrap();
        canvas.sketch(&layout).unwrap();
        canvas.write(&out).unwrap();
        assert!(out.exists());
        assert!(std::fs::metadata(&out).unwrap().len() > 0);

        // second write fails, as does sketching again
        assert!(matches!(canvas.write(&out), Err(SketchError::Render(_))));
        assert!(matches!(canvas.sketch(&layout), Err(SketchError::Render(_))));
    }

    #[test]
    fn test_svg_output_contains_document() {
        let layout = small_layout();
        let height = layout.height().unwrap().ceil() as u32;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("sketch.svg");

        let mut canvas = ImageCanvas::new(OutputFormat::Svg, 400, height).unwrap();
        canvas.sketch(&layout).unwrap();
        canvas.write(&out).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("<svg"));
        assert!(text.contains("rect"));
    }

    #[test]
    fn test_write_requires_sketch() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("blank.png");
        let mut canvas = ImageCanvas::new(OutputFormat::Png, 100, 100).unwrap();
        assert!(matches!(canvas.write(&out), Err(SketchError::Render(_))));
        assert!(!out.exists());
    }

    #[test]
    fn test_zero_size_canvas_rejected() {
        assert!(ImageCanvas::new(OutputFormat::Png, 0, 100).is_err());
        assert!(ImageCanvas::new(OutputFormat::Png, 100, 0).is_err());
    }

    #[test]
    fn test_null_canvas_single_use() {
        let layout = small_layout();
        let mut canvas = NullCanvas::new();
        canvas.sketch(&layout).unwrap();
        canvas.write(Path::new("/nonexistent/never-written.png")).unwrap();
        assert!(canvas.write(Path::new("/nonexistent/never-written.png")).is_err());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::from_name("png").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_name("svg").unwrap(), OutputFormat::Svg);
        assert!(OutputFormat::from_name("pdf").is_err());
    }
}
