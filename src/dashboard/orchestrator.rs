use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::join_all;
use geo::Point;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    common::{ColorScale, DateRange, Rgb, Spectral, VALUE_FIELDS, number_field},
    loader::{DataLoader, Fetcher, VectorData, features, properties},
    observation::{ObservationPoint, filter_by_category, filter_observations},
    overlay::{
        MapBackend, MapView, Marker, OverlayManager, OverlayName, OverlaySpec, PathStyle,
        PixelColorFn, RendererFactory, StyleFn,
    },
    raster::{RasterDecoder, RasterGrid, Validity, average},
    region::{Region, RegionTable, Settings},
};

use super::{
    Outcome, Route, Selection, Stats, Status, StatusPanel, resolve_route,
    style::Palette,
    units::{UnitAggregate, aggregate_units, unit_values},
};

const MARKER_COLOR: Rgb = Rgb::new(0xd9, 0x46, 0x0f);
const MARKER_RADIUS: f64 = 5.0;

/// A started selection. Results are only applied while the ticket is the latest one issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    generation: u64,
    selection: Selection,
    route: Route,
}

impl Ticket {
    #[inline] pub fn generation(&self) -> u64 { self.generation }

    #[inline] pub fn selection(&self) -> &Selection { &self.selection }

    #[inline] pub fn route(&self) -> Route { self.route }
}

/// Data loaded for a ticket, ready to draw.
#[derive(Debug, Clone)]
pub enum Prepared {
    Choropleth {
        units: Vec<UnitAggregate>,
        days_loaded: usize,
        days_requested: usize,
        observations: Option<Vec<ObservationPoint>>,
    },
    Grid {
        grid: RasterGrid,
        days_loaded: usize,
        days_requested: usize,
        observations: Option<Vec<ObservationPoint>>,
    },
    Static {
        vector: Option<Arc<VectorData>>,
        raster: Option<RasterGrid>,
        observations: Option<Vec<ObservationPoint>>,
    },
    /// Nothing usable for the selection. `observations` is what to show instead, if anything.
    NoData {
        message: String,
        observations: Option<Vec<ObservationPoint>>,
    },    /// Nothing was loaded and the map stays as it is, e.g. for an over-long date range.
    Info(String),
}

/// Drives a selection from route resolution to drawn overlays.
///
/// A selection runs in three steps: [`begin`](Self::begin) claims a new generation,
/// [`prepare`](Self::prepare) loads data without touching the map, and
/// [`apply`](Self::apply) draws it unless a newer selection has begun since.
pub struct Orchestrator<F, R> {
    regions: RegionTable,
    settings: Settings,
    access_token: Option<String>,
    loader: DataLoader<F>,
    renderers: R,
    decoder: Option<Arc<dyn RasterDecoder>>,
    scale: Arc<dyn ColorScale>,
    overlays: OverlayManager,
    status: StatusPanel,
    generation: u64,
    applied: Option<Selection>,
    rendered: Option<Stats>,
}

impl<F: Fetcher, R: RendererFactory> Orchestrator<F, R> {
    pub fn new(regions: RegionTable, settings: Settings, loader: DataLoader<F>, renderers: R) -> Self {
        let access_token = settings.access_token.clone().filter(|t| !t.trim().is_empty());
        let overlays = OverlayManager::new(settings.overlay_opacity);
        Self {
            regions,
            settings,
            access_token,
            loader,
            renderers,
            decoder: None,
            scale: Arc::new(Spectral::default()),
            overlays,
            status: StatusPanel::default(),
            generation: 0,
            applied: None,
            rendered: None,
        }
    }

    /// Decoder for GeoTIFF payloads. Without one, raster sources cannot be drawn.
    pub fn with_decoder(mut self, decoder: impl RasterDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn with_color_scale(mut self, scale: impl ColorScale + 'static) -> Self {
        self.scale = Arc::new(scale);
        self
    }

    #[inline] pub fn regions(&self) -> &RegionTable { &self.regions }

    #[inline] pub fn loader(&self) -> &DataLoader<F> { &self.loader }

    #[inline] pub fn renderers(&self) -> &R { &self.renderers }

    #[inline] pub fn overlays(&self) -> &OverlayManager { &self.overlays }

    #[inline] pub fn status(&self) -> &Status { self.status.status() }

    /// The selection currently on the map.
    #[inline] pub fn applied(&self) -> Option<&Selection> { self.applied.as_ref() }

    fn region(&self, id: &str) -> Result<&Region> {
        self.regions.get(id).with_context(|| format!("Unknown region {id:?}"))
    }

    /// Route `selection` would take with the current renderers and token.
    pub fn route_for(&self, selection: &Selection) -> Result<Route> {
        let region = self.region(&selection.region)?;
        Ok(resolve_route(region, selection.model, self.renderers.capabilities(), self.access_token.is_some()))
    }

    /// Start a selection. Any ticket issued earlier becomes stale.
    pub fn begin(&mut self, selection: Selection) -> Result<Ticket> {
        let route = self.route_for(&selection)?;
        let name = self.region(&selection.region)?.name.clone();
        self.generation += 1;
        info!("Selection {}: {} via {route} ({})", self.generation, selection.region, selection.dates);
        self.status.set(Status::Loading(name));
        Ok(Ticket { generation: self.generation, selection, route })
    }

    /// Load everything `ticket` needs. Does not touch the map or the status panel.
    pub async fn prepare(&self, ticket: &Ticket) -> Result<Prepared> {
        let region = self.region(&ticket.selection.region)?;
        let (days, limit) = (ticket.selection.dates.num_days(), self.settings.max_range_days);
        if ticket.route != Route::StaticRegion && days > limit {
            warn!("Refusing {days}-day range for {} (limit {limit})", region.id);
            return Ok(Prepared::Info(format!("{days} days selected; choose a range of at most {limit} days")));
        }
        match ticket.route {
            Route::VectorTileChoropleth => self.prepare_choropleth(region, &ticket.selection).await,
            Route::RasterGrid => self.prepare_grid(region, &ticket.selection).await,
            Route::StaticRegion => self.prepare_static(region, &ticket.selection).await,
        }
    }

    async fn prepare_choropleth(&self, region: &Region, selection: &Selection) -> Result<Prepared> {
        let model = region.sources.municipality_model.as_ref()
            .with_context(|| format!("[Orchestrator.prepare] region {:?} has no municipality model", region.id))?;

        let urls: Vec<String> = selection.dates.days().into_iter().map(|day| model.url_for(day)).collect();
        let results = join_all(urls.iter().map(|url| self.loader.load_json(url))).await;

        let mut loaded = Vec::with_capacity(urls.len());
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(doc) => loaded.push(unit_values(&doc, model)),
                Err(e) => warn!("Skipping {url}: {e:#}"),
            }
        }
        debug!("Loaded {}/{} municipality files for {}", loaded.len(), urls.len(), region.id);

        let units = aggregate_units(&loaded);
        if units.is_empty() {
            return Ok(Prepared::NoData {
                message: format!("No municipality data for {} between {}", region.name, selection.dates),
                observations: self.fallback_observations(region, selection).await,
            });
        }

        Ok(Prepared::Choropleth {
            units,
            days_loaded: loaded.len(),
            days_requested: urls.len(),
            observations: self.selected_observations(region, &selection.observations, &selection.dates).await,
        })
    }

    /// First candidate URL that loads, in the model's order.
    async fn first_candidate(&self, urls: Vec<String>) -> Option<Bytes> {
        for url in &urls {
            match self.loader.load_raster_bytes(url).await {
                Ok(bytes) => return Some(bytes),
                Err(e) => debug!("Candidate {url} unavailable: {e:#}"),
            }
        }
        warn!("No raster available among {} candidates", urls.len());
        None
    }

    fn decoder(&self) -> Result<&dyn RasterDecoder> {
        self.decoder.as_deref().context("[Orchestrator.prepare] raster payload loaded but no decoder installed")
    }

    async fn prepare_grid(&self, region: &Region, selection: &Selection) -> Result<Prepared> {
        let model = region.sources.grid_model.as_ref()
            .with_context(|| format!("[Orchestrator.prepare] region {:?} has no grid model", region.id))?;

        let days = selection.dates.days();
        let fetched = join_all(days.iter().map(|day| self.first_candidate(model.candidate_urls(*day)))).await;
        let payloads: Vec<Bytes> = fetched.into_iter().flatten().collect();

        let mut grids = Vec::with_capacity(payloads.len());
        if !payloads.is_empty() {
            let decoder = self.decoder()?;
            for bytes in &payloads {
                match decoder.decode(bytes) {
                    Ok(grid) => grids.push(grid),
                    Err(e) => warn!("Skipping undecodable raster: {e:#}"),
                }
            }
        }
        debug!("Decoded {}/{} daily grids for {}", grids.len(), days.len(), region.id);

        let observations = self.selected_observations(region, &selection.observations, &selection.dates).await;
        let Some(grid) = average(&grids, model.validity) else {
            return Ok(Prepared::NoData {
                message: format!("No grid data for {} between {}", region.name, selection.dates),
                observations,
            });
        };
        if grid.valid_values(model.validity).is_empty() {
            return Ok(Prepared::NoData {
                message: format!("No valid predictions for {} between {}", region.name, selection.dates),
                observations,
            });
        }

        Ok(Prepared::Grid { grid, days_loaded: grids.len(), days_requested: days.len(), observations })
    }

    async fn prepare_static(&self, region: &Region, selection: &Selection) -> Result<Prepared> {
        let sources = &region.sources;
        let vector = match &sources.vector {
            Some(url) => Some(self.loader.load_vector(url).await),
            None => None,
        };

        let raster = match &sources.raster {
            Some(url) if self.renderers.capabilities().raster_layers => match self.loader.load_raster_bytes(url).await {
                Ok(bytes) => match self.decoder()?.decode(&bytes) {
                    Ok(grid) => Some(grid),
                    Err(e) => {
                        warn!("Could not decode {url}: {e:#}");
                        None
                    }
                },
                Err(e) => {
                    warn!("Could not load {url}: {e:#}");
                    None
                }
            },
            Some(url) => {
                debug!("Skipping {url}: renderer has no raster layers");
                None
            }
            None => None,
        };

        let observations = self.selected_observations(region, &selection.observations, &selection.dates).await;
        Ok(Prepared::Static { vector, raster, observations })
    }

    async fn load_observations(&self, region: &Region) -> Option<Vec<ObservationPoint>> {
        let source = region.sources.observations.as_ref()?;
        match ObservationPoint::load(&self.loader, source).await {
            Ok(points) => Some(points),
            Err(e) => {
                warn!("Could not load observations for {}: {e:#}", region.id);
                None
            }
        }
    }

    async fn selected_observations(&self, region: &Region, key: &Option<String>, dates: &DateRange) -> Option<Vec<ObservationPoint>> {
        let key = key.as_deref()?;
        let points = self.load_observations(region).await?;
        Some(filter_observations(&points, key, dates))
    }

    /// Observations shown when the model has nothing: category filter only, every date.
    async fn fallback_observations(&self, region: &Region, selection: &Selection) -> Option<Vec<ObservationPoint>> {
        let points = self.load_observations(region).await?;
        Some(match selection.observations.as_deref() {
            Some(key) => filter_by_category(&points, key),
            None => points,
        })
    }

    /// Draw `prepared`, unless a newer selection has begun since `ticket` was issued.
    pub fn apply(&mut self, ticket: Ticket, prepared: Prepared) -> Result<Outcome> {
        if ticket.generation != self.generation {
            debug!("Dropping stale selection {} (latest is {})", ticket.generation, self.generation);
            return Ok(Outcome::Superseded);
        }

        let result = self.draw(&ticket, prepared);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.status.set(Status::Error(format!("{e:#}")));
                return Err(e);
            }
        };
        if let Some(status) = outcome.status() {
            self.status.set(status);
        }
        self.rendered = match &outcome {
            Outcome::Rendered(stats) => Some(stats.clone()),
            _ => None,
        };
        self.applied = Some(ticket.selection);
        Ok(outcome)
    }

    /// Begin, prepare and apply `selection` in one go.
    pub async fn select(&mut self, selection: Selection) -> Result<Outcome> {
        let ticket = self.begin(selection)?;
        let prepared = match self.prepare(&ticket).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.status.set(Status::Error(format!("{e:#}")));
                return Err(e);
            }
        };
        self.apply(ticket, prepared)
    }

    fn draw(&mut self, ticket: &Ticket, prepared: Prepared) -> Result<Outcome> {
        let region = self.region(&ticket.selection.region)?.clone();
        let view = MapView::of(&region);

        match prepared {
            Prepared::Choropleth { units, days_loaded, days_requested, observations } => {
                let model = region.sources.municipality_model.as_ref()
                    .context("[Orchestrator.apply] choropleth without a municipality model")?;
                self.mount_vector_tiles(view)?;

                let palette = Palette::new(self.scale.clone(), model.max_value, model.validity);
                let colors: BTreeMap<String, Rgb> = units.iter()
                    .filter_map(|u| Some((u.code.clone(), palette.color(u.value)?)))
                    .collect();
                let stats = Stats::from_values(units.iter().map(|u| u.value).filter(|v| palette.accepts(*v)));
                self.overlays.add_overlay(OverlayName::Risk, OverlaySpec::Choropleth { tiles: model.tiles.clone(), colors }, true)?;

                let shown = self.show_points(observations)?;
                Ok(match stats {
                    Some(stats) => Outcome::Rendered(stats.with_days(days_loaded, days_requested).with_observations(shown)),
                    None => Outcome::Info(format!("No valid predictions for {} between {}", region.name, ticket.selection.dates)),
                })
            }
            Prepared::Grid { grid, days_loaded, days_requested, observations } => {
                let model = region.sources.grid_model.as_ref()
                    .context("[Orchestrator.apply] grid without a grid model")?;
                self.mount_tiles(view)?;

                let stats = Stats::from_values(grid.valid_values(model.validity));
                let palette = Palette::new(self.scale.clone(), model.max_value, model.validity).with_no_data(grid.no_data());
                self.overlays.add_overlay(OverlayName::RasterGrid, raster_spec(grid, palette), true)?;

                let shown = self.show_points(observations)?;
                Ok(match stats {
                    Some(stats) => Outcome::Rendered(stats.with_days(days_loaded, days_requested).with_observations(shown)),
                    None => Outcome::Info(format!("No valid predictions for {} between {}", region.name, ticket.selection.dates)),
                })
            }
            Prepared::Static { vector, raster, observations } => {
                self.mount_tiles(view)?;
                self.draw_static(&region, vector, raster, observations)
            }
            Prepared::NoData { message, observations } => {
                if ticket.route == Route::VectorTileChoropleth {
                    warn!("{message}; falling back to a tile map");
                }
                self.mount_tiles(view)?;
                self.show_points(observations)?;
                Ok(Outcome::NoData(message))
            }
            Prepared::Info(message) => Ok(Outcome::Info(message)),
        }
    }

    fn draw_static(
        &mut self,
        region: &Region,
        vector: Option<Arc<VectorData>>,
        raster: Option<RasterGrid>,
        observations: Option<Vec<ObservationPoint>>,
    ) -> Result<Outcome> {
        let sources = &region.sources;
        let vector_values: Vec<f64> = vector.iter()
            .flat_map(|v| features(&v.geojson))
            .filter_map(|f| number_field(properties(f)?, VALUE_FIELDS))
            .filter(|v| v.is_finite())
            .collect();
        let raster_values: Vec<f64> = raster.as_ref()
            .map(|grid| grid.valid_values(sources.raster_validity))
            .unwrap_or_default();

        let max = sources.max_value.unwrap_or_else(|| {
            vector_values.iter().chain(&raster_values).copied().fold(f64::NEG_INFINITY, f64::max)
        });

        let mut layers = 0;
        if let Some(vector) = vector {
            let palette = Palette::new(self.scale.clone(), max, Validity::SentinelOnly);
            let style: StyleFn = Arc::new(move |feature: &Value| PathStyle {
                fill: properties(feature)
                    .and_then(|p| number_field(p, VALUE_FIELDS))
                    .and_then(|v| palette.color(v)),
                ..Default::default()
            });
            let data = Arc::new(vector.geojson.clone());
            self.overlays.add_overlay(OverlayName::Risk, OverlaySpec::Features { data, style }, true)?;
            layers += 1;
        }
        if let Some(grid) = raster {
            let palette = Palette::new(self.scale.clone(), max, sources.raster_validity).with_no_data(grid.no_data());
            self.overlays.add_overlay(OverlayName::RasterGrid, raster_spec(grid, palette), true)?;
            layers += 1;
        }
        let shown = self.show_points(observations)?;

        if layers == 0 {
            return Ok(Outcome::Info(format!("No map layers configured for {}", region.name)));
        }
        Ok(match Stats::from_values(vector_values.into_iter().chain(raster_values)) {
            Some(stats) => Outcome::Rendered(stats.with_observations(shown)),
            None => Outcome::Info(format!("Showing {}; no values to summarize", region.name)),
        })
    }

    fn mount_tiles(&mut self, view: MapView) -> Result<()> {
        self.overlays.unmount();
        let map = self.renderers.create_tile_map(view)?;
        self.overlays.mount(MapBackend::Tile(map));
        Ok(())
    }

    fn mount_vector_tiles(&mut self, view: MapView) -> Result<()> {
        self.overlays.unmount();
        let token = self.access_token.as_deref()
            .context("[Orchestrator.apply] vector-tile map needs an access token")?;
        let map = self.renderers.create_vector_tile_map(view, &self.settings.vector_style_url, token)?;
        self.overlays.mount(MapBackend::VectorTile(map));
        Ok(())
    }

    /// Replace the observation overlay. Returns how many points are drawn.
    fn show_points(&mut self, observations: Option<Vec<ObservationPoint>>) -> Result<Option<usize>> {
        self.overlays.remove_overlay(OverlayName::Observations);
        let Some(points) = observations else { return Ok(None) };
        if !points.is_empty() {
            let markers = points.iter().map(marker).collect();
            self.overlays.add_overlay(OverlayName::Observations, OverlaySpec::Points { markers }, true)?;
        }
        Ok(Some(points.len()))
    }

    /// Overlay observations of category `key` on the current map, filtered to its dates.
    pub async fn show_observations(&mut self, key: &str) -> Result<Outcome> {
        let selection = self.applied.clone().context("[Orchestrator.show_observations] nothing selected")?;
        let region = self.region(&selection.region)?.clone();
        if region.sources.observations.is_none() {
            let message = format!("No observation data for {}", region.name);
            self.status.set(Status::Info(message.clone()));
            return Ok(Outcome::Info(message));
        }

        let key = Some(key.to_string());
        let Some(points) = self.selected_observations(&region, &key, &selection.dates).await else {
            return Ok(Outcome::NoData(format!("Observations for {} could not be loaded", region.name)));
        };
        let shown = self.show_points(Some(points))?.unwrap_or(0);
        self.applied = Some(Selection { observations: key, ..selection });

        if let Some(stats) = self.rendered.as_mut() {
            stats.observations = Some(shown);
        }
        let outcome = match (shown, &self.rendered) {
            (0, _) => Outcome::Info(format!("No observations match for {} in this period", region.name)),
            (_, Some(stats)) => Outcome::Rendered(stats.clone()),
            (n, None) => Outcome::Info(format!("{n} observations shown")),
        };
        if let Some(status) = outcome.status() {
            self.status.set(status);
        }
        Ok(outcome)
    }

    /// Remove the observation overlay, if any.
    pub fn hide_observations(&mut self) -> bool {
        if let Some(selection) = self.applied.as_mut() {
            selection.observations = None;
        }
        self.overlays.remove_overlay(OverlayName::Observations)
    }

    #[inline]
    pub fn set_opacity(&mut self, value: f64) { self.overlays.set_opacity(value) }

    #[inline]
    pub fn set_visibility(&mut self, name: OverlayName, visible: bool) { self.overlays.set_visibility(name, visible) }

    /// Tear down the map and reset the panel. Pending tickets become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.overlays.unmount();
        self.applied = None;
        self.rendered = None;
        self.status.set(Status::Idle);
    }
}

fn raster_spec(grid: RasterGrid, palette: Palette) -> OverlaySpec {
    let color: PixelColorFn = Arc::new(move |pixel: &[f64]| pixel.first().and_then(|v| palette.color(*v)));
    OverlaySpec::Raster { grid: Arc::new(grid), color }
}

fn marker(point: &ObservationPoint) -> Marker {
    let label = match (&point.category, point.date) {
        (Some(category), Some(day)) => Some(format!("{category} ({day})")),
        (Some(category), None) => Some(category.clone()),
        (None, Some(day)) => Some(day.to_string()),
        (None, None) => None,
    };
    Marker { position: Point::new(point.lon(), point.lat()), color: MARKER_COLOR, radius: MARKER_RADIUS, label }
}
