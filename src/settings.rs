use crate::chain::{ChainOptions, PaddingPolicy};
use crate::geometry::{LayerSpec, TransformOptions};
use crate::layout::LayoutConfig;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone)]
#[structopt(
    name = "rfviz",
    about = "Receptive field geometry of a stack of 1D convolution layers"
)]
pub struct Settings {
    /// Input sequence length
    #[structopt(short, long, default_value = "16")]
    pub length: usize,

    /// Layer as `kernel,stride[,padding[,dilation]]`. Repeat once per layer, input side first
    #[structopt(long = "layer", number_of_values = 1)]
    pub layers: Vec<LayerSpec>,

    /// JSON file holding the layer list, e.g. `[{"kernel":3,"stride":2,"padding":1,"dilation":1}]`
    #[structopt(long)]
    pub layers_file: Option<PathBuf>,

    /// Cell side in pixels
    #[structopt(long, default_value = "18")]
    pub cell_size: f64,

    /// Gap between input cells in pixels
    #[structopt(long, default_value = "2")]
    pub cell_gap: f64,

    /// Distance between rows in pixels
    #[structopt(long, default_value = "80")]
    pub row_height: f64,

    /// Blank border around the image in pixels
    #[structopt(long, default_value = "20")]
    pub margin: f64,

    /// Restart every layer's start offset from 0.5
    #[structopt(long)]
    pub legacy_start: bool,

    /// Leave dilation out of the arithmetic
    #[structopt(long)]
    pub ignore_dilation: bool,

    /// Fail when a layer's padding disagrees with its output length
    #[structopt(long)]
    pub strict_padding: bool,

    /// Output image
    #[structopt(short, long, default_value = "rf.png")]
    pub output: PathBuf,

    /// Skip writing the image
    #[structopt(long)]
    pub no_image: bool,

    /// Print the chain and layout as JSON instead of the layer summary
    #[structopt(long)]
    pub json: bool,

    /// Debug logging
    #[structopt(short, long)]
    pub verbose: bool,
}

impl Settings {
    /// Reject pixel sizes that can't produce a drawable layout
    pub fn check(&self) -> Result<()> {
        let positive = [
            ("--cell-size", self.cell_size),
            ("--row-height", self.row_height),
        ];
        for (name, value) in positive.iter() {
            if !value.is_finite() || *value <= 0.0 {
                bail!("{} must be a positive number, got {}", name, value);
            }
        }
        let non_negative = [("--cell-gap", self.cell_gap), ("--margin", self.margin)];
        for (name, value) in non_negative.iter() {
            if !value.is_finite() || *value < 0.0 {
                bail!("{} must be zero or a positive number, got {}", name, value);
            }
        }
        Ok(())
    }

    /// Layers from `--layer` or `--layers-file`
    pub fn layer_specs(&self) -> Result<Vec<LayerSpec>> {
        match &self.layers_file {
            Some(_) if !self.layers.is_empty() => {
                bail!("Use either --layer or --layers-file, not both")
            }
            Some(path) => load_layers(path),
            None => Ok(self.layers.clone()),
        }
    }

    pub fn chain_options(&self) -> ChainOptions {
        ChainOptions {
            transform: TransformOptions {
                legacy_start: self.legacy_start,
                ignore_dilation: self.ignore_dilation,
            },
            padding: if self.strict_padding {
                PaddingPolicy::Reject
            } else {
                PaddingPolicy::Warn
            },
        }
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            cell_size: self.cell_size,
            cell_gap: self.cell_gap,
            row_height: self.row_height,
            ..LayoutConfig::default()
        }
    }
}

/// Read a persisted layer list
pub fn load_layers(path: &Path) -> Result<Vec<LayerSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read layers from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse layers in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Settings {
        Settings::from_iter(std::iter::once("rfviz").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.length, 16);
        assert!(cfg.layer_specs().unwrap().is_empty());
        assert_eq!(cfg.layout_config(), LayoutConfig::default());
        assert_eq!(cfg.chain_options(), ChainOptions::default());
        assert_eq!(cfg.output, PathBuf::from("rf.png"));
    }

    #[test]
    fn pixel_sizes_are_checked() {
        assert!(parse(&[]).check().is_ok());
        assert!(parse(&["--cell-gap", "0", "--margin", "0"]).check().is_ok());

        let bad: &[&[&str]] = &[
            &["--cell-size=0"],
            &["--cell-size=-4"],
            &["--row-height=inf"],
            &["--cell-gap=-1"],
            &["--cell-gap=NaN"],
            &["--margin=-0.5"],
        ];
        for args in bad {
            assert!(parse(args).check().is_err(), "{:?} accepted", args);
        }
    }

    #[test]
    fn repeated_layers() {
        let cfg = parse(&["-l", "10", "--layer", "3,2,1", "--layer", "3,1,1,2"]);
        assert_eq!(cfg.length, 10);
        assert_eq!(
            cfg.layer_specs().unwrap(),
            vec![LayerSpec::new(3, 2, 1), LayerSpec::new(3, 1, 1).with_dilation(2)]
        );
    }

    #[test]
    fn flags_map_to_options() {
        let cfg = parse(&["--legacy-start", "--ignore-dilation", "--strict-padding"]);
        let options = cfg.chain_options();
        assert!(options.transform.legacy_start);
        assert!(options.transform.ignore_dilation);
        assert_eq!(options.padding, PaddingPolicy::Reject);
    }

    #[test]
    fn layers_file() {
        let path = std::env::temp_dir().join(format!("rfviz-layers-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"kernel":3,"stride":2,"padding":1,"dilation":1},{"kernel":2,"stride":2}]"#,
        )
        .unwrap();

        let cfg = parse(&["--layers-file", path.to_str().unwrap()]);
        let layers = cfg.layer_specs();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            layers.unwrap(),
            vec![LayerSpec::new(3, 2, 1), LayerSpec::new(2, 2, 0)]
        );

        let both = parse(&["--layers-file", "x.json", "--layer", "3,1"]);
        assert!(both.layer_specs().is_err());

        assert!(load_layers(Path::new("/nonexistent/rfviz.json")).is_err());
    }
}
