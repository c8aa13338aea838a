use anyhow::{Context, Result};
use rfviz::chain::{compose, Chain};
use rfviz::geometry::LayerSpec;
use rfviz::layout::{layout, RenderGeometry};
use rfviz::render::{render, write_png, Palette};
use rfviz::settings::Settings;
use serde::Serialize;
use structopt::StructOpt;

#[derive(Serialize)]
struct Report<'a> {
    input_length: usize,
    layers: &'a [LayerSpec],
    chain: &'a Chain,
    geometry: &'a RenderGeometry,
}

fn main() {
    let cfg = Settings::from_args();

    let log_level = if cfg.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    )
    .format_timestamp(None)
    .init();

    if let Err(e) = run(&cfg) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cfg: &Settings) -> Result<()> {
    cfg.check()?;
    let layers = cfg.layer_specs()?;
    let chain = compose(cfg.length, &layers, &cfg.chain_options())
        .context("Cannot build the layer chain")?;
    let geometry = layout(&chain, &layers, &cfg.layout_config());

    if cfg.json {
        let report = Report {
            input_length: cfg.length,
            layers: &layers,
            chain: &chain,
            geometry: &geometry,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Input: L={}", cfg.length);
        for summary in chain.summaries(&layers) {
            println!("{}", summary);
        }
    }

    if !cfg.no_image {
        let pixmap = render(&geometry, &Palette::default(), cfg.margin)?;
        write_png(&pixmap, &cfg.output).context("Writing image")?;
        log::info!(
            "Wrote {}x{} image to {}",
            pixmap.width(),
            pixmap.height(),
            cfg.output.display()
        );
    }

    Ok(())
}
