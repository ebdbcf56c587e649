use anyhow::Result;
use tracing::info;
use vectorisk::{
    AppConfig, Capabilities, DataLoader, DateSelector, Fetcher, HeadlessRenderers, ModelSelector,
    Orchestrator, Outcome, Selection, TiffDecoder,
};

use super::Source;
use crate::cli::{Cli, RenderArgs};

pub async fn run(cli: &Cli, args: &RenderArgs) -> Result<()> {
    let config = super::load_config(cli)?;
    match Source::new(cli, &config)? {
        Source::Disk(loader) => render(config, loader, args).await,
        Source::Http(loader) => render(config, loader, args).await,
    }
}

async fn render<F: Fetcher>(config: AppConfig, loader: DataLoader<F>, args: &RenderArgs) -> Result<()> {
    let dates = DateSelector::parse(&args.start, args.end.as_deref())?.to_range();
    let model: ModelSelector = args.model.parse()?;
    let mut selection = Selection::new(&args.region, dates).with_model(model);
    if let Some(key) = &args.observations {
        selection = selection.with_observations(key);
    }

    let renderers = if args.tile_only { HeadlessRenderers::tile_only() } else { HeadlessRenderers::new(Capabilities::default()) };
    let mut orchestrator = Orchestrator::new(config.region_table(), config.settings, loader, renderers.clone())
        .with_decoder(TiffDecoder);

    let outcome = orchestrator.select(selection).await?;
    info!("Outcome: {outcome:?}");
    if let Outcome::NoData(message) = &outcome {
        eprintln!("{message}");
    }
    println!("{}", orchestrator.status());

    let scene = renderers.snapshot();
    if let Some(map) = scene.live_map() {
        println!("{} map at ({:.3}, {:.3}) zoom {}", map.kind.to_str(), map.view.center.lat, map.view.center.lon, map.view.zoom);
        for layer in &map.layers {
            let shown = if layer.visible { "visible" } else { "hidden" };
            println!(
                "  {:<24} {:<8} {shown:<8} opacity {:.2}  {} items, {} colored",
                layer.id, layer.kind, layer.opacity, layer.items, layer.colored
            );
        }
    }
    Ok(())
}
