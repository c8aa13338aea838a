pub mod chain;
pub mod geometry;
pub mod layout;
pub mod render;
pub mod settings;

pub use chain::{compose, Chain, ChainError, ChainOptions, PaddingPolicy};
pub use geometry::{apply, GeometryState, LayerSpec, TransformOptions};
pub use layout::{layout, LayoutConfig, RenderGeometry};
