use std::io::Cursor;

use serde_json::json;
use tiff::encoder::{TiffEncoder, colortype};
use vectorisk::{
    AppConfig, BackendKind, Capabilities, DataLoader, DateRange, HeadlessRenderers, MemFetcher,
    ModelSelector, Orchestrator, OverlayName, Outcome, Route, Selection, Settings, Status,
    TiffDecoder,
};

const CONFIG: &str = r#"
    [settings]
    access_token = "pk.test"

    [[regions]]
    id = "spain"
    name = "Spain"
    category = "country"
    center = { lat = 40.4, lon = -3.7 }
    zoom = 6

    [regions.sources.municipality_model]
    base_url = "https://m.test"
    file_pattern = "vri_{date}.json"
    max_value = 0.5
    code_width = 5
    tiles = { url = "mapbox://m.tiles", source_layer = "munis", code_property = "NATCODE" }

    [regions.sources.observations]
    url = "https://o.test/obs.geojson"

    [[regions]]
    id = "italy"
    name = "Italy"
    category = "country"
    center = { lat = 42.5, lon = 12.5 }
    zoom = 6

    [regions.sources.grid_model]
    base_url = "https://g.test"
    file_patterns = ["vri_{yyyymmdd}.tif", "vri_{date}.tif"]
    max_value = 1.0

    [[regions]]
    id = "barcelona"
    name = "Barcelona"
    category = "city"
    center = { lat = 41.39, lon = 2.17 }
    zoom = 12

    [regions.sources]
    vector = "https://s.test/bcn.geojson"
    raster = "https://s.test/bcn.tif"

    [[regions]]
    id = "empty"
    name = "Nowhere"
    category = "city"
    center = { lat = 0.0, lon = 0.0 }
    zoom = 3
"#;

fn config() -> AppConfig { AppConfig::from_toml_str(CONFIG).unwrap() }

fn range(start: &str, end: &str) -> DateRange { DateRange::parse(start, end).unwrap() }

fn orchestrator(fetcher: MemFetcher, renderers: &HeadlessRenderers) -> Orchestrator<MemFetcher, HeadlessRenderers> {
    let config = config();
    Orchestrator::new(config.region_table(), config.settings, DataLoader::new(fetcher), renderers.clone())
        .with_decoder(TiffDecoder)
}

fn tiff(width: u32, height: u32, values: &[f32]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    TiffEncoder::new(&mut buf).unwrap()
        .write_image::<colortype::Gray32Float>(width, height, values)
        .unwrap();
    buf.into_inner()
}

fn observations() -> String {
    json!({
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [2.1, 41.4] },
              "properties": { "species": "Aedes albopictus", "date": "2023-05-02" } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-3.7, 40.4] },
              "properties": { "species": "Aedes albopictus", "date": "2024-06-03" } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-0.4, 39.5] },
              "properties": { "species": "Culex pipiens", "date": "2024-06-03" } }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn choropleth_averages_units_across_days() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-01.json", json!([{ "code": "8019", "vri": 0.10 }, { "code": "28079", "vri": 0.4 }]).to_string())
        .with("https://m.test/vri_2024-06-02.json", json!([{ "natcode": "08019", "vri": 0.20 }]).to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("spain", range("2024-06-01", "2024-06-02"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!(stats.count, 2);
    assert!((stats.min - 0.15).abs() < 1e-9);
    assert_eq!(stats.max, 0.4);
    assert_eq!((stats.days_loaded, stats.days_requested), (2, 2));
    assert!(matches!(orch.status(), Status::Ready(_)));

    let scene = renderers.snapshot();
    let map = scene.live_map().unwrap();
    assert_eq!(map.kind, BackendKind::VectorTile);
    let layer = map.layer("risk-layer").unwrap();
    assert_eq!((layer.items, layer.colored), (2, 2));
    assert_eq!(layer.opacity, 0.7);
}

#[tokio::test]
async fn missing_days_are_skipped() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-02.json", json!([{ "code": "08019", "vri": 0.3 }]).to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("spain", range("2024-06-01", "2024-06-03"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!((stats.days_loaded, stats.days_requested), (1, 3));
    assert_eq!(stats.mean, 0.3);
}

#[tokio::test]
async fn total_failure_falls_back_to_tile_map_with_observations() {
    let fetcher = MemFetcher::new().with("https://o.test/obs.geojson", observations());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let selection = Selection::new("spain", range("2024-07-01", "2024-07-05")).with_observations("ae-albopictus");
    let outcome = orch.select(selection).await.unwrap();
    assert!(matches!(outcome, Outcome::NoData(_)));
    assert!(matches!(orch.status(), Status::Error(_)));

    let scene = renderers.snapshot();
    let map = scene.live_map().unwrap();
    assert_eq!(map.kind, BackendKind::Tile);
    // Category filter only: both albopictus points, whatever their date.
    assert_eq!(map.layer("observations").unwrap().items, 2);
    assert_eq!(orch.loader().fetcher().requests("https://m.test/vri_2024-07-03.json"), 1);
}

#[tokio::test]
async fn stale_ticket_is_not_applied() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-01.json", json!([{ "code": "1", "vri": 0.1 }]).to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let first = orch.begin(Selection::new("spain", range("2024-06-01", "2024-06-01"))).unwrap();
    let second = orch.begin(Selection::new("barcelona", range("2024-06-01", "2024-06-01"))).unwrap();
    assert_eq!(second.route(), Route::StaticRegion);

    let prepared = orch.prepare(&first).await.unwrap();
    assert_eq!(orch.apply(first, prepared).unwrap(), Outcome::Superseded);
    assert_eq!(renderers.snapshot().created, 0);
    assert!(matches!(orch.status(), Status::Loading(_)));

    let prepared = orch.prepare(&second).await.unwrap();
    assert!(!matches!(orch.apply(second, prepared).unwrap(), Outcome::Superseded));
    assert_eq!(orch.applied().unwrap().region, "barcelona");
}

#[tokio::test]
async fn switching_routes_tears_down_previous_map() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-01.json", json!([{ "code": "1", "vri": 0.1 }]).to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    orch.select(Selection::new("spain", range("2024-06-01", "2024-06-01"))).await.unwrap();
    orch.select(Selection::new("barcelona", range("2024-06-01", "2024-06-01"))).await.unwrap();

    let scene = renderers.snapshot();
    assert_eq!((scene.created, scene.destroyed), (2, 1));
    assert_eq!(scene.live_backend(), Some(BackendKind::Tile));
}

#[tokio::test]
async fn grid_averages_daily_rasters() {
    let fetcher = MemFetcher::new()
        .with("https://g.test/vri_20240601.tif", tiff(2, 1, &[0.25, 0.0]))
        .with("https://g.test/vri_2024-06-02.tif", tiff(2, 1, &[0.75, 0.0]));
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("italy", range("2024-06-01", "2024-06-02"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    // Zero is not a valid prediction under the default rule.
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean, 0.5);
    assert_eq!((stats.days_loaded, stats.days_requested), (2, 2));

    let scene = renderers.snapshot();
    let layer = scene.live_map().unwrap().layer("raster-grid").unwrap();
    assert_eq!((layer.items, layer.colored), (2, 1));
}

#[tokio::test]
async fn grid_no_prediction_day_does_not_lower_the_mean() {
    let fetcher = MemFetcher::new()
        .with("https://g.test/vri_20240601.tif", tiff(1, 1, &[0.0]))
        .with("https://g.test/vri_20240602.tif", tiff(1, 1, &[0.6]));
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("italy", range("2024-06-01", "2024-06-02"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!(stats.count, 1);
    assert!((stats.mean - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn choropleth_no_prediction_day_does_not_lower_the_mean() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-01.json", json!([{ "code": "1", "vri": 0.0 }]).to_string())
        .with("https://m.test/vri_2024-06-02.json", json!([{ "code": "1", "vri": 0.6 }]).to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("spain", range("2024-06-01", "2024-06-02"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean, 0.6);
}

#[tokio::test]
async fn over_long_range_is_refused_without_fetching() {
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let config = config();
    let settings = Settings { max_range_days: 3, ..config.settings.clone() };
    let mut orch = Orchestrator::new(config.region_table(), settings, DataLoader::new(MemFetcher::new()), renderers.clone());

    let outcome = orch.select(Selection::new("spain", range("2024-06-01", "2024-06-10"))).await.unwrap();
    assert!(matches!(outcome, Outcome::Info(_)));
    assert!(matches!(orch.status(), Status::Info(_)));
    assert_eq!(orch.loader().fetcher().total_requests(), 0);
    assert_eq!(renderers.snapshot().created, 0);

    let outcome = orch.select(Selection::new("spain", range("2024-06-01", "2024-06-03"))).await.unwrap();
    assert!(!matches!(outcome, Outcome::Info(_)));
}

#[tokio::test]
async fn grid_without_decoder_is_an_error() {
    let fetcher = MemFetcher::new().with("https://g.test/vri_20240601.tif", tiff(1, 1, &[0.5]));
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let config = config();
    let mut orch = Orchestrator::new(config.region_table(), config.settings, DataLoader::new(fetcher), renderers.clone());

    assert!(orch.select(Selection::new("italy", range("2024-06-01", "2024-06-01"))).await.is_err());
    assert!(matches!(orch.status(), Status::Error(_)));
}

#[tokio::test]
async fn grid_with_no_files_reports_no_data() {
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(MemFetcher::new(), &renderers);

    let outcome = orch.select(Selection::new("italy", range("2024-06-01", "2024-06-02"))).await.unwrap();
    assert!(matches!(outcome, Outcome::NoData(_)));
    // Both candidate patterns were tried for each day.
    assert_eq!(orch.loader().fetcher().total_requests(), 4);
}

#[tokio::test]
async fn static_region_styles_features_by_value() {
    let geojson = json!({
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "geometry": null, "properties": { "vri": 0.2 } },
            { "type": "Feature", "geometry": null, "properties": { "risk": 0.4 } },
            { "type": "Feature", "geometry": null, "properties": { "name": "park" } }
        ]
    });
    let fetcher = MemFetcher::new().with("https://s.test/bcn.geojson", geojson.to_string());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let outcome = orch.select(Selection::new("barcelona", range("2024-06-01", "2024-06-01"))).await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!((stats.count, stats.min, stats.max), (2, 0.2, 0.4));

    let scene = renderers.snapshot();
    let map = scene.live_map().unwrap();
    assert_eq!(map.layer_ids(), vec!["risk"]);
    let layer = map.layer("risk").unwrap();
    assert_eq!((layer.items, layer.colored), (3, 2));
}

#[tokio::test]
async fn region_without_layers_is_informational() {
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(MemFetcher::new(), &renderers);

    let outcome = orch.select(Selection::new("empty", range("2024-06-01", "2024-06-01"))).await.unwrap();
    assert!(matches!(outcome, Outcome::Info(_)));
    assert_eq!(renderers.snapshot().live_backend(), Some(BackendKind::Tile));
}

#[tokio::test]
async fn without_vector_tiles_municipality_region_takes_static_route() {
    let renderers = HeadlessRenderers::tile_only();
    let mut orch = orchestrator(MemFetcher::new(), &renderers);
    let selection = Selection::new("spain", range("2024-06-01", "2024-06-01"));
    assert_eq!(orch.route_for(&selection).unwrap(), Route::StaticRegion);

    let config = config();
    let table = config.region_table();
    let settings = Settings { access_token: None, ..config.settings };
    let no_token = Orchestrator::new(table, settings, DataLoader::new(MemFetcher::new()), HeadlessRenderers::new(Capabilities::default()));
    assert_eq!(no_token.route_for(&selection).unwrap(), Route::StaticRegion);

    assert!(matches!(orch.select(selection).await.unwrap(), Outcome::Info(_)));
}

#[tokio::test]
async fn grid_model_can_be_selected_explicitly() {
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let orch = orchestrator(MemFetcher::new(), &renderers);
    let selection = Selection::new("italy", range("2024-06-01", "2024-06-01")).with_model(ModelSelector::HighResolutionGrid);
    assert_eq!(orch.route_for(&selection).unwrap(), Route::RasterGrid);
}

#[tokio::test]
async fn observations_follow_selection_dates() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-03.json", json!([{ "code": "1", "vri": 0.1 }]).to_string())
        .with("https://o.test/obs.geojson", observations());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let selection = Selection::new("spain", range("2024-06-03", "2024-06-03")).with_observations("ae-albopictus");
    let Outcome::Rendered(stats) = orch.select(selection).await.unwrap() else { panic!("expected a rendered map") };
    assert_eq!(stats.observations, Some(1));

    let outcome = orch.show_observations("ae-koreicus").await.unwrap();
    assert!(matches!(outcome, Outcome::Info(_)));
    assert!(!orch.overlays().is_active(OverlayName::Observations));

    let outcome = orch.show_observations("all").await.unwrap();
    let Outcome::Rendered(stats) = outcome else { panic!("unexpected outcome {outcome:?}") };
    assert_eq!(stats.observations, Some(2));
}

#[tokio::test]
async fn opacity_skips_markers() {
    let fetcher = MemFetcher::new()
        .with("https://m.test/vri_2024-06-03.json", json!([{ "code": "1", "vri": 0.1 }]).to_string())
        .with("https://o.test/obs.geojson", observations());
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(fetcher, &renderers);

    let selection = Selection::new("spain", range("2024-06-03", "2024-06-03")).with_observations("all");
    orch.select(selection).await.unwrap();
    orch.set_opacity(0.3);
    orch.set_visibility(OverlayName::Risk, false);

    let scene = renderers.snapshot();
    let map = scene.live_map().unwrap();
    let risk = map.layer("risk-layer").unwrap();
    assert_eq!((risk.opacity, risk.visible), (0.3, false));
    assert_eq!(map.layer("observations-layer").unwrap().opacity, 1.0);
}

#[tokio::test]
async fn unknown_region_is_rejected() {
    let renderers = HeadlessRenderers::new(Capabilities::default());
    let mut orch = orchestrator(MemFetcher::new(), &renderers);
    assert!(orch.begin(Selection::new("atlantis", range("2024-06-01", "2024-06-01"))).is_err());
    assert_eq!(orch.status(), &Status::Idle);
}
