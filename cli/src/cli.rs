use std::path::PathBuf;

/// Vector-risk dashboard core, driven headless
#[derive(clap::Parser, Debug)]
#[command(name = "vectorisk", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Region configuration file
    #[arg(short, long, global = true, default_value = "vectorisk.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Resolve URLs against this directory instead of fetching them
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// List configured regions and the route each would take
    Regions,

    /// Load a selection and print what would be drawn
    Render(RenderArgs),

    /// Print a region's time series as chart data (JSON)
    Series(SeriesArgs),
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Region id
    pub region: String,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub start: String,

    /// Last day, YYYY-MM-DD; defaults to the first day
    #[arg(long)]
    pub end: Option<String>,

    /// Model variant: municipalities or grid
    #[arg(short, long, default_value = "municipalities")]
    pub model: String,

    /// Observation category to overlay, e.g. ae-albopictus or all
    #[arg(short, long)]
    pub observations: Option<String>,

    /// Pretend the vector-tile renderer is unavailable
    #[arg(long)]
    pub tile_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct SeriesArgs {
    /// Region id
    pub region: String,

    /// Administrative unit code for a subregion series
    #[arg(long)]
    pub code: Option<String>,

    /// Extra fields to chart on the right axis
    #[arg(long, value_delimiter = ',', default_values = ["temperature", "precipitation"])]
    pub secondary: Vec<String>,
}
