pub mod regions;
pub mod render;
pub mod series;

use anyhow::Result;
use vectorisk::{AppConfig, DataLoader, DiskFetcher, HttpFetcher};

use crate::cli::Cli;

pub fn load_config(cli: &Cli) -> Result<AppConfig> { AppConfig::load_from_file(&cli.config) }

/// Loader over local files when `--data-dir` is given, HTTP otherwise.
pub enum Source {
    Disk(DataLoader<DiskFetcher>),
    Http(DataLoader<HttpFetcher>),
}

impl Source {
    pub fn new(cli: &Cli, config: &AppConfig) -> Result<Self> {
        Ok(match &cli.data_dir {
            Some(dir) => Source::Disk(DataLoader::new(DiskFetcher::new(dir))),
            None => {
                let settings = &config.settings;
                Source::Http(DataLoader::new(HttpFetcher::new(settings.request_timeout(), &settings.user_agent)?))
            }
        })
    }
}
