use crate::geometry::{
    apply, output_length, GeometryState, LayerSpec, TransformOptions, MAX_EXTENT,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do when a layer's declared padding disagrees with the padding
/// implied by its output length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingPolicy {
    /// Log it, record it in [`Chain::warnings`] and keep the declared padding
    Warn,
    /// Fail the whole chain
    Reject,
}

impl Default for PaddingPolicy {
    fn default() -> Self {
        PaddingPolicy::Warn
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainOptions {
    pub transform: TransformOptions,
    pub padding: PaddingPolicy,
}

/// A layer whose symmetric implied padding differs from the declared one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingMismatch {
    /// Index of the layer, starting at 0
    pub layer: usize,
    pub declared: usize,
    pub reconciled: i64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("input length must be positive")]
    EmptyInput,

    #[error("input length {length} exceeds the supported maximum")]
    InputTooLong { length: usize },

    #[error("layer index {layer}: {reason}")]
    InvalidLayer { layer: usize, reason: &'static str },

    #[error("layer index {layer} maps length {input_length} to {length}; no more layers can be added")]
    NonPositiveLength {
        layer: usize,
        input_length: usize,
        length: i64,
    },

    #[error("layer index {layer} grows the length to {length}, past the supported maximum")]
    LengthTooLarge { layer: usize, length: i64 },

    #[error(
        "layer index {} declares padding {} but its output length implies {}",
        .0.layer, .0.declared, .0.reconciled
    )]
    InconsistentPadding(PaddingMismatch),
}

/// Geometry history of a layer chain: one state for the input, then one per layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chain {
    states: Vec<GeometryState>,
    lengths: Vec<usize>,
    warnings: Vec<PaddingMismatch>,
    options: TransformOptions,
}

impl Chain {
    fn new(input_length: usize, options: TransformOptions) -> Self {
        Self {
            states: vec![GeometryState::input(input_length)],
            lengths: vec![input_length],
            warnings: vec![],
            options,
        }
    }

    /// Every state, input first
    pub fn states(&self) -> &[GeometryState] {
        &self.states
    }

    pub fn input(&self) -> &GeometryState {
        &self.states[0]
    }

    pub fn last(&self) -> &GeometryState {
        &self.states[self.states.len() - 1]
    }

    /// Sequence length per row, input first
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn warnings(&self) -> &[PaddingMismatch] {
        &self.warnings
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Number of layers applied
    pub fn layers(&self) -> usize {
        self.states.len() - 1
    }

    /// Per-layer text summaries. `layers` must be the list the chain was composed from.
    pub fn summaries(&self, layers: &[LayerSpec]) -> Vec<LayerSummary> {
        layers
            .iter()
            .zip(&self.states[1..])
            .zip(&self.lengths[1..])
            .enumerate()
            .map(|(i, ((layer, state), &length))| LayerSummary {
                index: i + 1,
                layer: *layer,
                receptive_field: state.receptive_field,
                length,
            })
            .collect()
    }
}

/// One line of the per-layer report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerSummary {
    /// Layer number, starting at 1
    pub index: usize,
    pub layer: LayerSpec,
    pub receptive_field: f64,
    pub length: usize,
}

impl fmt::Display for LayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layer {}: K{},S{},D{},P{} RF={} L={}",
            self.index,
            self.layer.kernel_size,
            self.layer.stride,
            self.layer.dilation,
            self.layer.padding,
            self.receptive_field,
            self.length
        )
    }
}

/// Pushes an input of `input_length` cells through `layers`, in order.
///
/// Stops at the first layer whose output would be empty; nothing is returned
/// for the layers before it.
pub fn compose(
    input_length: usize,
    layers: &[LayerSpec],
    options: &ChainOptions,
) -> Result<Chain, ChainError> {
    if input_length == 0 {
        return Err(ChainError::EmptyInput);
    }
    if input_length > MAX_EXTENT {
        return Err(ChainError::InputTooLong {
            length: input_length,
        });
    }

    let seed = Chain::new(input_length, options.transform);
    layers
        .iter()
        .enumerate()
        .try_fold(seed, |mut chain, (idx, layer)| {
            layer
                .check()
                .map_err(|reason| ChainError::InvalidLayer { layer: idx, reason })?;

            let prev_length = chain.lengths[chain.lengths.len() - 1];
            let length = output_length(
                prev_length as i64,
                layer.effective_kernel(options.transform.ignore_dilation) as i64,
                layer.padding as i64,
                layer.stride as i64,
            );
            let non_positive = ChainError::NonPositiveLength {
                layer: idx,
                input_length: prev_length,
                length,
            };
            if length <= 0 {
                return Err(non_positive);
            }
            if length > MAX_EXTENT as i64 {
                return Err(ChainError::LengthTooLarge { layer: idx, length });
            }

            let transition = apply(chain.last(), layer, &options.transform);
            let state = transition.state().ok_or(non_positive)?;
            debug_assert_eq!(state.count as i64, length);

            if let Some(reconciled) = transition.padding_mismatch(layer.padding) {
                let mismatch = PaddingMismatch {
                    layer: idx,
                    declared: layer.padding,
                    reconciled,
                };
                match options.padding {
                    PaddingPolicy::Reject => return Err(ChainError::InconsistentPadding(mismatch)),
                    PaddingPolicy::Warn => {
                        log::warn!(
                            "Layer index {}: declared padding {} but output length implies {}",
                            idx,
                            layer.padding,
                            reconciled
                        );
                        chain.warnings.push(mismatch);
                    }
                }
            }

            log::debug!(
                "Layer index {}: L={} jump={} RF={} start={}",
                idx,
                length,
                state.jump,
                state.receptive_field,
                state.start
            );

            chain.states.push(state);
            chain.lengths.push(length as usize);
            Ok(chain)
        })
}
