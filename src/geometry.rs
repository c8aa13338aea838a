use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use std::str::FromStr;

/// Center of the first input cell, in input coordinates
pub const INPUT_START: f64 = 0.5;

/// Largest sequence length, stride, padding or dilated kernel span accepted.
///
/// Keeps every intermediate of [`apply`] well inside `i64`.
pub const MAX_EXTENT: usize = i32::MAX as usize;

/// Geometry of one stage of the chain, measured in input coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryState {
    /// Number of units at this stage
    pub count: usize,
    /// Distance between two adjacent units
    pub jump: f64,
    /// Span of input seen by one unit
    pub receptive_field: f64,
    /// Center of the first unit
    pub start: f64,
}

impl GeometryState {
    /// State of the raw input sequence of `length` cells
    pub fn input(length: usize) -> Self {
        Self {
            count: length,
            jump: 1.0,
            receptive_field: 1.0,
            start: INPUT_START,
        }
    }
}

/// Parameters of a single convolution or pooling layer.
///
/// Serialized with the keys of the persisted layer list
/// (`kernel`, `stride`, `padding`, `dilation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(rename = "kernel", alias = "kernel_size")]
    pub kernel_size: usize,
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    #[serde(default = "default_dilation")]
    pub dilation: usize,
}

fn default_dilation() -> usize {
    1
}

impl LayerSpec {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> Self {
        Self {
            kernel_size,
            stride,
            padding,
            dilation: 1,
        }
    }

    pub fn with_dilation(self, dilation: usize) -> Self {
        Self { dilation, ..self }
    }

    /// Returns the reason this layer can't be applied, if any
    pub fn check(&self) -> Result<(), &'static str> {
        if self.kernel_size == 0 {
            return Err("kernel size must be at least 1");
        }
        if self.stride == 0 {
            return Err("stride must be at least 1");
        }
        if self.dilation == 0 {
            return Err("dilation must be at least 1");
        }
        if self.stride > MAX_EXTENT {
            return Err("stride is too large");
        }
        if self.padding > MAX_EXTENT {
            return Err("padding is too large");
        }
        match self
            .dilation
            .checked_mul(self.kernel_size - 1)
            .and_then(|span| span.checked_add(1))
        {
            Some(span) if span <= MAX_EXTENT => Ok(()),
            _ => Err("dilated kernel span is too large"),
        }
    }

    /// Span of input covered by one kernel application
    pub fn effective_kernel(&self, ignore_dilation: bool) -> usize {
        if ignore_dilation {
            self.kernel_size
        } else {
            self.dilation * (self.kernel_size - 1) + 1
        }
    }

    /// Distance between two kernel taps, in units of the previous row
    pub fn tap_spacing(&self, ignore_dilation: bool) -> usize {
        if ignore_dilation {
            1
        } else {
            self.dilation
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseLayerError {
    #[error("expected `kernel,stride[,padding[,dilation]]`, got {0} fields")]
    FieldCount(usize),

    #[error("invalid {field}: {source}")]
    Number {
        field: &'static str,
        source: ParseIntError,
    },
}

impl FromStr for LayerSpec {
    type Err = ParseLayerError;

    /// Parses `kernel,stride[,padding[,dilation]]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const FIELDS: [&str; 4] = ["kernel", "stride", "padding", "dilation"];

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > FIELDS.len() {
            return Err(ParseLayerError::FieldCount(parts.len()));
        }

        let mut values = [0, 0, 0, 1];
        for (i, part) in parts.iter().enumerate() {
            values[i] = part.parse().map_err(|source| ParseLayerError::Number {
                field: FIELDS[i],
                source,
            })?;
        }

        let [kernel_size, stride, padding, dilation] = values;
        Ok(Self {
            kernel_size,
            stride,
            padding,
            dilation,
        })
    }
}

/// Arithmetic variants of the layer transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Restart every layer from `INPUT_START` instead of the propagated start
    pub legacy_start: bool,
    /// Treat every layer as if its dilation were 1
    pub ignore_dilation: bool,
}

/// Result of pushing a state through one layer.
///
/// `count` is signed: a non-positive count means the layer can't be applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub count: i64,
    pub jump: f64,
    pub receptive_field: f64,
    pub start: f64,
    /// Padding implied on the left by the output length
    pub pad_left: i64,
    /// Padding implied on the right by the output length
    pub pad_right: i64,
}

impl Transition {
    /// The next state, or `None` if the output is empty
    pub fn state(&self) -> Option<GeometryState> {
        if self.count <= 0 {
            return None;
        }
        Some(GeometryState {
            count: self.count as usize,
            jump: self.jump,
            receptive_field: self.receptive_field,
            start: self.start,
        })
    }

    /// The implied symmetric padding when it disagrees with `declared`
    pub fn padding_mismatch(&self, declared: usize) -> Option<i64> {
        if self.pad_left == self.pad_right && self.pad_left != declared as i64 {
            Some(self.pad_left)
        } else {
            None
        }
    }
}

/// `floor((length - kernel + 2 * padding) / stride) + 1`
pub fn output_length(length: i64, kernel: i64, padding: i64, stride: i64) -> i64 {
    (length - kernel + 2 * padding).div_euclid(stride) + 1
}

/// Pushes `state` through `layer`. The layer must pass [`LayerSpec::check`]
/// and `state.count` must not exceed [`MAX_EXTENT`].
pub fn apply(state: &GeometryState, layer: &LayerSpec, options: &TransformOptions) -> Transition {
    let n_in = state.count as i64;
    let k = layer.effective_kernel(options.ignore_dilation) as i64;
    let s = layer.stride as i64;
    let p = layer.padding as i64;

    let n_out = output_length(n_in, k, p, s);

    // Odd totals put the extra cell on the right
    let total_pad = (k + (n_out - 1) * s) - n_in;
    let pad_left = total_pad.div_euclid(2);
    let pad_right = total_pad - pad_left;

    let start_in = if options.legacy_start {
        INPUT_START
    } else {
        state.start
    };

    Transition {
        count: n_out,
        jump: state.jump * s as f64,
        receptive_field: state.receptive_field + (k - 1) as f64 * state.jump,
        start: start_in + ((k - 1) as f64 / 2.0 - pad_left as f64) * state.jump,
        pad_left,
        pad_right,
    }
}
