//! Maps a composed chain onto a 2D diagram: one row of cells per stage,
//! padding cells, fan-in lines and nested receptive-field highlights.
//!
//! All coordinates are pixels with `y` growing downwards; the input row is
//! the topmost row.

use crate::chain::Chain;
use crate::geometry::LayerSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Side of a square cell
    pub cell_size: f64,
    /// Horizontal space between two input cells
    pub cell_gap: f64,
    /// Vertical distance between two rows
    pub row_height: f64,
    /// Left edge of the first input cell
    pub origin_x: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            cell_size: 18.0,
            cell_gap: 2.0,
            row_height: 80.0,
            origin_x: 0.0,
        }
    }
}

impl LayoutConfig {
    /// Horizontal distance between two adjacent input cells
    pub fn pitch(&self) -> f64 {
        self.cell_size + self.cell_gap
    }

    /// Top edge of row `row`, the input being row 0
    pub fn row_y(&self, row: usize) -> f64 {
        self.row_height * (row + 1) as f64
    }
}

/// Left edges of the real cells of one row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    pub row: usize,
    pub y: f64,
    pub xs: Vec<f64>,
}

/// Implicit padding cell drawn beside a row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaddingCell {
    pub row: usize,
    pub x: f64,
    pub y: f64,
}

/// Line from an output cell down to one of the cells feeding it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    /// Layer producing the output cell, starting at 0
    pub layer: usize,
    pub unit: usize,
    pub from: (f64, f64),
    pub to: (f64, f64),
    /// Whether the output cell is the focus unit
    pub focus: bool,
}

/// Translucent box over the input row spanning one layer's receptive field
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HighlightSpan {
    pub layer: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn include_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.include(x, y);
        self.include(x + width, y + height);
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }
}

/// Everything a renderer needs to draw the diagram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderGeometry {
    pub cell_size: f64,
    /// One row per stage, input first
    pub unit_positions: Vec<UnitRow>,
    pub padding_positions: Vec<PaddingCell>,
    pub connector_segments: Vec<Segment>,
    /// Index of the focus unit within the last row, if there are any layers
    pub focus_index: Option<usize>,
    /// One span per layer, innermost first
    pub highlight_spans: Vec<HighlightSpan>,
}

impl RenderGeometry {
    /// Row holding the focus unit
    pub fn focus_row(&self) -> Option<&UnitRow> {
        self.focus_index.and(self.unit_positions.last())
    }

    /// Left edge of the focus unit
    pub fn focus_x(&self) -> Option<f64> {
        let row = self.focus_row()?;
        row.xs.get(self.focus_index?).copied()
    }

    /// Smallest box holding every cell, line and highlight
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        let size = self.cell_size;
        for row in &self.unit_positions {
            for &x in &row.xs {
                bounds.include_rect(x, row.y, size, size);
            }
        }
        for cell in &self.padding_positions {
            bounds.include_rect(cell.x, cell.y, size, size);
        }
        for seg in &self.connector_segments {
            bounds.include(seg.from.0, seg.from.1);
            bounds.include(seg.to.0, seg.to.1);
        }
        for span in &self.highlight_spans {
            bounds.include_rect(span.x, span.y, span.width, span.height);
        }
        if bounds.min_x > bounds.max_x {
            return Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            };
        }
        bounds
    }
}

/// Lays out `chain`. `layers` must be the list the chain was composed from.
pub fn layout(chain: &Chain, layers: &[LayerSpec], cfg: &LayoutConfig) -> RenderGeometry {
    let pitch = cfg.pitch();
    let half = cfg.cell_size / 2.0;
    let lengths = chain.lengths();
    let ignore_dilation = chain.options().ignore_dilation;
    let n_layers = chain.layers().min(layers.len());

    let focus_index = if n_layers > 0 {
        Some((lengths[n_layers] - 1) / 2)
    } else {
        None
    };

    let input = UnitRow {
        row: 0,
        y: cfg.row_y(0),
        xs: (0..lengths[0])
            .map(|i| cfg.origin_x + pitch * i as f64)
            .collect(),
    };

    let mut rows = vec![input];
    let mut padding_positions = vec![];
    let mut connector_segments = vec![];
    let mut prev_pitch = pitch;

    for (l, layer) in layers.iter().take(n_layers).enumerate() {
        let prev_y = cfg.row_y(l);
        let (first, last) = {
            let xs = &rows[l].xs;
            (
                xs.first().copied().unwrap_or(cfg.origin_x),
                xs.last().copied().unwrap_or(cfg.origin_x),
            )
        };

        for q in 0..layer.padding {
            let offset = prev_pitch * (q + 1) as f64;
            padding_positions.push(PaddingCell {
                row: l,
                x: first - offset,
                y: prev_y,
            });
            padding_positions.push(PaddingCell {
                row: l,
                x: last + offset,
                y: prev_y,
            });
        }

        let row_pitch = prev_pitch * layer.stride as f64;
        let kernel_span = (layer.effective_kernel(ignore_dilation) - 1) as f64 * prev_pitch;
        let tap = layer.tap_spacing(ignore_dilation) as f64 * prev_pitch;
        let base = first - prev_pitch * layer.padding as f64 + kernel_span / 2.0;
        let y = cfg.row_y(l + 1);
        let is_last = l + 1 == n_layers;

        let xs: Vec<f64> = (0..lengths[l + 1])
            .map(|j| base + row_pitch * j as f64)
            .collect();

        for (j, &x) in xs.iter().enumerate() {
            let focus = is_last && focus_index == Some(j);
            let top = (x + half, y);
            let leftmost = x + half - kernel_span / 2.0;
            for t in 0..layer.kernel_size {
                connector_segments.push(Segment {
                    layer: l,
                    unit: j,
                    from: top,
                    to: (leftmost + tap * t as f64, y - cfg.row_height + cfg.cell_size),
                    focus,
                });
            }
        }

        rows.push(UnitRow { row: l + 1, y, xs });
        prev_pitch = row_pitch;
    }

    let focus_x = focus_index.and_then(|i| rows[n_layers].xs.get(i).copied());
    let highlight_spans = match focus_x {
        Some(focus_x) => chain.states()[1..=n_layers]
            .iter()
            .enumerate()
            .map(|(l, state)| {
                let rf = state.receptive_field;
                let grow = half * (l + 1) as f64;
                HighlightSpan {
                    layer: l,
                    x: focus_x - pitch * (rf - 1.0) / 2.0 - cfg.cell_gap / 2.0,
                    y: cfg.row_y(0) - grow / 2.0,
                    width: rf * pitch,
                    height: cfg.cell_size + grow,
                }
            })
            .collect(),
        None => vec![],
    };

    RenderGeometry {
        cell_size: cfg.cell_size,
        unit_positions: rows,
        padding_positions,
        connector_segments,
        focus_index,
        highlight_spans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{compose, ChainOptions};

    fn geometry(input_length: usize, layers: &[LayerSpec]) -> (Chain, RenderGeometry) {
        let chain = compose(input_length, layers, &ChainOptions::default()).unwrap();
        let geometry = layout(&chain, layers, &LayoutConfig::default());
        (chain, geometry)
    }

    #[test]
    fn no_layers_is_just_the_input_row() {
        let (_, g) = geometry(4, &[]);
        assert_eq!(
            g.unit_positions,
            vec![UnitRow {
                row: 0,
                y: 80.0,
                xs: vec![0.0, 20.0, 40.0, 60.0],
            }]
        );
        assert!(g.padding_positions.is_empty());
        assert!(g.connector_segments.is_empty());
        assert!(g.highlight_spans.is_empty());
        assert_eq!(g.focus_index, None);
        assert_eq!(g.focus_x(), None);
    }

    #[test]
    fn same_padding_layer_lines_up_with_input() {
        let (_, g) = geometry(5, &[LayerSpec::new(3, 1, 1)]);
        let out = &g.unit_positions[1];
        assert_eq!(out.y, 160.0);
        assert_eq!(out.xs, vec![0.0, 20.0, 40.0, 60.0, 80.0]);

        let pads: Vec<(f64, f64)> = g.padding_positions.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(pads, vec![(-20.0, 80.0), (100.0, 80.0)]);

        assert_eq!(g.focus_index, Some(2));
        let focus: Vec<&Segment> = g.connector_segments.iter().filter(|s| s.focus).collect();
        assert_eq!(focus.len(), 3);
        let ends: Vec<(f64, f64)> = focus.iter().map(|s| s.to).collect();
        assert_eq!(ends, vec![(29.0, 98.0), (49.0, 98.0), (69.0, 98.0)]);
        assert!(focus.iter().all(|s| s.from == (49.0, 160.0)));
    }

    #[test]
    fn strided_rows_spread_out() {
        let layers = [LayerSpec::new(3, 2, 1), LayerSpec::new(3, 2, 1)];
        let (_, g) = geometry(10, &layers);

        assert_eq!(g.unit_positions[1].xs, vec![0.0, 40.0, 80.0, 120.0, 160.0]);
        assert_eq!(g.unit_positions[2].xs, vec![0.0, 80.0, 160.0]);

        // Second layer pads its input row with the first layer's pitch
        let row1_pads: Vec<f64> = g
            .padding_positions
            .iter()
            .filter(|c| c.row == 1)
            .map(|c| c.x)
            .collect();
        assert_eq!(row1_pads, vec![-40.0, 200.0]);

        assert_eq!(g.focus_index, Some(1));
        assert_eq!(g.focus_x(), Some(80.0));
        assert_eq!(g.connector_segments.len(), 3 * 5 + 3 * 3);
    }

    #[test]
    fn highlight_widths_follow_receptive_fields() {
        let layers = [
            LayerSpec::new(3, 2, 1),
            LayerSpec::new(3, 2, 1),
            LayerSpec::new(2, 1, 0),
        ];
        let cfg = LayoutConfig::default();
        let (chain, g) = geometry(32, &layers);

        assert_eq!(g.highlight_spans.len(), layers.len());
        let focus_x = g.focus_x().unwrap();
        for span in &g.highlight_spans {
            let rf = chain.states()[span.layer + 1].receptive_field;
            assert_eq!(span.width, rf * cfg.pitch());
            // Centered on the focus unit
            let center = span.x + span.width / 2.0;
            assert!((center - (focus_x + cfg.cell_size / 2.0)).abs() < 1e-9);
        }
        let heights: Vec<f64> = g.highlight_spans.iter().map(|s| s.height).collect();
        assert_eq!(heights, vec![27.0, 36.0, 45.0]);
    }

    #[test]
    fn focus_is_middle_of_last_row() {
        for &n in &[1usize, 2, 7, 8] {
            let (chain, g) = geometry(n, &[LayerSpec::new(1, 1, 0)]);
            assert_eq!(chain.lengths()[1], n);
            assert_eq!(g.focus_index, Some((n - 1) / 2));
        }
    }

    #[test]
    fn dilated_taps_skip_cells() {
        let (_, g) = geometry(8, &[LayerSpec::new(3, 1, 0).with_dilation(2)]);
        assert_eq!(g.unit_positions[1].xs[0], 40.0);
        let first: Vec<f64> = g
            .connector_segments
            .iter()
            .filter(|s| s.unit == 0)
            .map(|s| s.to.0)
            .collect();
        assert_eq!(first, vec![9.0, 49.0, 89.0]);
    }

    #[test]
    fn ignored_dilation_uses_plain_kernel() {
        let layers = [LayerSpec::new(3, 1, 0).with_dilation(2)];
        let options = ChainOptions {
            transform: crate::geometry::TransformOptions {
                legacy_start: false,
                ignore_dilation: true,
            },
            ..Default::default()
        };
        let chain = compose(8, &layers, &options).unwrap();
        let g = layout(&chain, &layers, &LayoutConfig::default());

        assert_eq!(g.unit_positions[1].xs.len(), 6);
        assert_eq!(g.unit_positions[1].xs[0], 20.0);
        assert_eq!(g.unit_positions[1].xs[5], 120.0);
        let first: Vec<f64> = g
            .connector_segments
            .iter()
            .filter(|s| s.unit == 0)
            .map(|s| s.to.0)
            .collect();
        assert_eq!(first, vec![9.0, 29.0, 49.0]);
        assert_eq!(g.highlight_spans[0].width, 3.0 * 20.0);
    }

    #[test]
    fn bounds_cover_padding_and_highlights() {
        let (_, g) = geometry(5, &[LayerSpec::new(3, 1, 1)]);
        let b = g.bounds();
        assert_eq!(b.min_x, -20.0);
        assert_eq!(b.max_x, 118.0);
        assert_eq!(b.min_y, 75.5);
        assert_eq!(b.max_y, 178.0);
    }

    #[test]
    fn layout_is_deterministic() {
        let layers = [LayerSpec::new(5, 2, 2), LayerSpec::new(3, 1, 1)];
        assert_eq!(geometry(17, &layers), geometry(17, &layers));
    }
}
