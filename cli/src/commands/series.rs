use anyhow::{Context, Result};
use vectorisk::{ChartData, DataLoader, Fetcher, Region, TimeSeries};

use super::Source;
use crate::cli::{Cli, SeriesArgs};

pub async fn run(cli: &Cli, args: &SeriesArgs) -> Result<()> {
    let config = super::load_config(cli)?;
    let table = config.region_table();
    let region = table.get(&args.region).with_context(|| format!("Unknown region {:?}", args.region))?;
    match Source::new(cli, &config)? {
        Source::Disk(loader) => series(&loader, region, args).await,
        Source::Http(loader) => series(&loader, region, args).await,
    }
}

async fn series<F: Fetcher>(loader: &DataLoader<F>, region: &Region, args: &SeriesArgs) -> Result<()> {
    let series = match &args.code {
        Some(code) => TimeSeries::load_subregion(loader, region, code).await?,
        None => TimeSeries::load_region(loader, region).await?,
    };
    if series.is_fallback() {
        eprintln!("Time series for {} is unavailable; showing sample data", region.name);
    }

    let secondary: Vec<&str> = args.secondary.iter().map(String::as_str).collect();
    let chart = ChartData::from_series(&series.points, &secondary);
    println!("{}", serde_json::to_string_pretty(&chart)?);
    Ok(())
}
