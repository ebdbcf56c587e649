use anyhow::Result;
use vectorisk::{Capabilities, ModelSelector, resolve_route};

use crate::cli::Cli;

pub fn run(cli: &Cli) -> Result<()> {
    let config = super::load_config(cli)?;
    let has_token = config.settings.access_token.is_some();
    let caps = Capabilities::default();

    for region in config.region_table().iter() {
        let route = resolve_route(region, ModelSelector::Municipalities, caps, has_token);
        let grid = if region.sources.grid_model.is_some() {
            format!(", grid: {}", resolve_route(region, ModelSelector::HighResolutionGrid, caps, has_token))
        } else {
            String::new()
        };
        println!("{:<16} {:<24} {:?} -> {route}{grid}", region.id, region.name, region.category);
    }
    if !has_token {
        eprintln!("No access token configured; vector-tile routes are unavailable");
    }
    Ok(())
}
