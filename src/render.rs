use crate::layout::{RenderGeometry, Segment};
use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tiny_skia::{Color, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

pub type Rgb = [u8; 3];

#[derive(Debug, Clone)]
pub struct Palette {
    pub background: Rgb,
    pub input: Rgb,
    pub padding: Rgb,
    pub line: Rgb,
    pub focus: Rgb,
    /// Cycled through by layer
    pub layers: Vec<Rgb>,
    /// Opacity of the receptive field highlights
    pub highlight_alpha: f32,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: [0xff, 0xff, 0xff],
            input: [0x42, 0x85, 0xf4],
            padding: [0x80, 0x80, 0x80],
            line: [0x00, 0x00, 0x00],
            focus: [0x00, 0x80, 0x00],
            layers: vec![
                [0xef, 0x47, 0x6f],
                [0xff, 0xd1, 0x66],
                [0x06, 0xd6, 0xa0],
                [0x11, 0x8a, 0xb2],
                [0x07, 0x3b, 0x4c],
            ],
            highlight_alpha: 0.3,
        }
    }
}

impl Palette {
    pub fn layer(&self, layer: usize) -> Rgb {
        if self.layers.is_empty() {
            return self.line;
        }
        self.layers[layer % self.layers.len()]
    }
}

fn paint(color: Rgb, alpha: f32, anti_alias: bool) -> Paint<'static> {
    let [r, g, b] = color;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, (alpha.max(0.0).min(1.0) * 255.0).round() as u8);
    paint.anti_alias = anti_alias;
    paint
}

fn cell(x: f64, y: f64, size: f64) -> Option<Rect> {
    Rect::from_xywh(x as f32, y as f32, size as f32, size as f32)
}

/// Draw `geometry` on a pixmap just large enough to hold it plus `margin` on every side
pub fn render(geometry: &RenderGeometry, palette: &Palette, margin: f64) -> Result<Pixmap> {
    let bounds = geometry.bounds();
    let margin = margin.max(0.0);
    let width = (bounds.width() + 2.0 * margin).ceil() as u32;
    let height = (bounds.height() + 2.0 * margin).ceil() as u32;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("Cannot allocate a {}x{} image", width, height))?;
    let [r, g, b] = palette.background;
    pixmap.fill(Color::from_rgba8(r, g, b, 255));

    // Top left corner of the bounds lands at (margin, margin)
    let shift = Transform::from_translate(
        (margin - bounds.min_x) as f32,
        (margin - bounds.min_y) as f32,
    );
    let size = geometry.cell_size;

    let pad_paint = paint(palette.padding, 1.0, false);
    for c in &geometry.padding_positions {
        if let Some(rect) = cell(c.x, c.y, size) {
            pixmap.fill_rect(rect, &pad_paint, shift, None);
        }
    }

    // Focus lines last so they stay on top
    let stroke = Stroke {
        width: 1.0,
        ..Stroke::default()
    };
    for &(focus, color) in [(false, palette.line), (true, palette.focus)].iter() {
        let segments = geometry
            .connector_segments
            .iter()
            .filter(|s: &&Segment| s.focus == focus);
        let mut pb = PathBuilder::new();
        for seg in segments {
            pb.move_to(seg.from.0 as f32, seg.from.1 as f32);
            pb.line_to(seg.to.0 as f32, seg.to.1 as f32);
        }
        if let Some(path) = pb.finish() {
            pixmap.stroke_path(&path, &paint(color, 1.0, true), &stroke, shift, None);
        }
    }

    let last_row = geometry.unit_positions.len() - 1;
    for row in &geometry.unit_positions {
        let color = match row.row {
            0 => palette.input,
            r => palette.layer(r - 1),
        };
        for (i, &x) in row.xs.iter().enumerate() {
            let color = if row.row == last_row && geometry.focus_index == Some(i) {
                palette.focus
            } else {
                color
            };
            if let Some(rect) = cell(x, row.y, size) {
                pixmap.fill_rect(rect, &paint(color, 1.0, false), shift, None);
            }
        }
    }

    for span in &geometry.highlight_spans {
        let color = palette.layer(span.layer);
        let rect = Rect::from_xywh(
            span.x as f32,
            span.y as f32,
            span.width as f32,
            span.height as f32,
        );
        if let Some(rect) = rect {
            pixmap.fill_rect(rect, &paint(color, palette.highlight_alpha, false), shift, None);
            let outline = PathBuilder::from_rect(rect);
            pixmap.stroke_path(&outline, &paint(color, 1.0, true), &stroke, shift, None);
        }
    }

    Ok(pixmap)
}

/// Write `pixmap` as an 8-bit RGBA PNG
pub fn write_png(pixmap: &Pixmap, path: &Path) -> Result<()> {
    let mut data = Vec::with_capacity(pixmap.pixels().len() * 4);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create image {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), pixmap.width(), pixmap.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .write_header()?
        .write_image_data(&data)
        .with_context(|| format!("Failed to encode image {}", path.display()))?;
    Ok(())
}
