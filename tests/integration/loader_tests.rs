//! Dataset loading tests, from store layout to registered image.
//!
//! Tests verify:
//! - Plates are served as a grid and every cell is addressable over HTTP
//! - Label images are listed and served next to their image
//! - Layouts that cannot be opened fail with the right error kind
//! - Query-string configuration overrides channel metadata
//! - Contrast limits are sampled from the lowest level only

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use ngff_streamer::dataset::{DatasetLoader, ImageConfig};
use ngff_streamer::store::{ArrayData, InMemoryStore};
use ngff_streamer::tile::{ImageRegistry, TileService};
use ngff_streamer::{create_router, LoadError, RouterConfig};

use super::test_utils::{get, get_json, multiscales_attrs, ome_pyramid_store, u16_values};

fn u32_values(body: &[u8]) -> Vec<u32> {
    body.chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// =============================================================================
// Fixtures
// =============================================================================

/// Add a single-level, two-channel OME image at `path` whose pixels all hold
/// `fill`.
fn with_field(store: InMemoryStore, path: &str, fill: u16) -> InMemoryStore {
    store
        .with_group(
            path,
            json!({
                "multiscales": multiscales_attrs(1, 1.0),
                "omero": {"channels": [
                    {"label": "A", "color": "FF0000", "window": {"start": 0, "end": 100}},
                    {"label": "B", "color": "00FF00", "window": {"start": 0, "end": 100}}
                ]}
            }),
        )
        .with_array(
            &format!("{}/0", path),
            vec![2, 4, 4],
            vec![1, 4, 4],
            ArrayData::Uint16(vec![fill; 32]),
        )
}

fn plate_store() -> InMemoryStore {
    let store = InMemoryStore::new("memory://plate")
        .with_group(
            "/",
            json!({"plate": {
                "name": "screen",
                "rows": [{"name": "A"}, {"name": "B"}],
                "columns": [{"name": "1"}, {"name": "2"}, {"name": "3"}],
                "wells": [{"path": "A/1"}, {"path": "B/3"}]
            }}),
        )
        .with_group("/A/1", json!({"well": {"images": [{"path": "0"}]}}))
        .with_group("/B/3", json!({"well": {"images": [{"path": "0"}]}}));
    let store = with_field(store, "/A/1/0", 7);
    with_field(store, "/B/3/0", 9)
}

/// The OME fixture pyramid with a `nuclei` label image whose pixel at
/// `(y, x)` holds `y * 12 + x`.
fn labelled_store() -> InMemoryStore {
    ome_pyramid_store("memory://labelled")
        .with_group("/labels", json!({"labels": ["nuclei"]}))
        .with_group(
            "/labels/nuclei",
            json!({
                "multiscales": [{"axes": ["z", "y", "x"], "datasets": [{"path": "0"}, {"path": "1"}]}],
                "image-label": {"colors": [{"label-value": 1, "rgba": [255, 0, 0, 255]}]}
            }),
        )
        .with_array(
            "/labels/nuclei/0",
            vec![1, 10, 12],
            vec![1, 4, 4],
            ArrayData::Uint32((0..120).collect()),
        )
        .with_array(
            "/labels/nuclei/1",
            vec![1, 5, 6],
            vec![1, 4, 4],
            ArrayData::Uint32(vec![0; 30]),
        )
}

/// Two-channel `c, y, x` pyramid without rendering metadata.
fn bare_multiscales_store() -> InMemoryStore {
    InMemoryStore::new("memory://bare")
        .with_group("/", json!({"multiscales": multiscales_attrs(1, 1.0)}))
        .with_array(
            "/0",
            vec![2, 4, 4],
            vec![1, 4, 4],
            ArrayData::Uint16((0..32).collect()),
        )
}

async fn register(
    store: InMemoryStore,
    path: &str,
    config: ImageConfig,
) -> Result<(ImageRegistry, String), LoadError> {
    let loader = DatasetLoader::new(Arc::new(store));
    let mut registry = ImageRegistry::new();
    let id = registry.load_with(&loader, path, config).await?;
    Ok((registry, id))
}

// =============================================================================
// Layouts
// =============================================================================

#[tokio::test]
async fn test_plate_grid_serves_every_cell() {
    let (registry, id) = register(plate_store(), "/", ImageConfig::new("/data/plate.zarr"))
        .await
        .unwrap();
    assert_eq!(id, "plate");

    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false),
    );

    let (status, json) = get_json(router.clone(), "/images/plate/layer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "grid");
    assert_eq!(json["layer_props"]["rows"], 2);
    assert_eq!(json["layer_props"]["columns"], 3);

    let (_, json) = get_json(router.clone(), "/images").await;
    assert_eq!(json["images"][0]["kind"], "plate");
    assert_eq!(json["images"][0]["name"], "screen");

    let (status, json) = get_json(router.clone(), "/images/plate").await;
    assert_eq!(status, StatusCode::OK);
    let cells = json["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[1]["name"], "B/3");
    assert_eq!(cells[1]["row"], 1);
    assert_eq!(cells[1]["col"], 2);
    assert_eq!(cells[1]["levels"][0]["width"], 4);

    // the image's own level is the first field
    let (status, _, body) = get(router.clone(), "/tiles/plate/0/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert!(u16_values(&body).iter().all(|&v| v == 7));

    let (status, _, body) = get(router.clone(), "/tiles/plate/cells/0/0/0/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert!(u16_values(&body).iter().all(|&v| v == 7));

    // well B/3 sits at row 1, column 2
    let (status, headers, body) =
        get(router.clone(), "/tiles/plate/cells/1/2/0/0/0?selection=1,0,0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-width"], "4");
    let values = u16_values(&body);
    assert_eq!(values.len(), 16);
    assert!(values.iter().all(|&v| v == 9));

    let (status, _, body) = get(router.clone(), "/raster/plate/cells/1/2/0").await;
    assert_eq!(status, StatusCode::OK);
    assert!(u16_values(&body).iter().all(|&v| v == 9));
}

#[tokio::test]
async fn test_missing_plate_cell_returns_404() {
    let (registry, _) = register(plate_store(), "/", ImageConfig::new("/data/plate.zarr"))
        .await
        .unwrap();
    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false),
    );

    // A/2 has no well
    let (status, json) = get_json(router.clone(), "/tiles/plate/cells/0/1/0/0/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");

    // cells have a single level
    let (status, json) = get_json(router, "/tiles/plate/cells/1/2/1/0/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_level");
}

#[tokio::test]
async fn test_label_image_is_served() {
    let config = ImageConfig::new("/data/labelled.zarr");
    let (registry, id) = register(labelled_store(), "/", config).await.unwrap();
    assert_eq!(id, "labelled");

    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false),
    );

    let (status, json) = get_json(router.clone(), "/images/labelled").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["labels"][0]["name"], "nuclei");
    assert_eq!(json["labels"][0]["levels"].as_array().unwrap().len(), 2);
    assert_eq!(json["cells"], json!([]));

    let (status, headers, body) =
        get(router.clone(), "/tiles/labelled/labels/nuclei/0/1/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-dtype"], "Uint32");
    let values = u32_values(&body);
    assert_eq!(values.len(), 16);
    // rows 4..8, columns 4..8
    assert_eq!(values[0], 4 * 12 + 4);
    assert_eq!(values[15], 7 * 12 + 7);

    let (status, headers, _) = get(router.clone(), "/raster/labelled/labels/nuclei/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-width"], "6");
    assert_eq!(headers["x-pixel-height"], "5");

    let (status, _, _) = get(router, "/tiles/labelled/labels/cells/0/0/0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bioformats2raw_layout_is_redirected() {
    let store = InMemoryStore::new("memory://raw")
        .with_group("/", json!({"bioformats2raw.layout": 3}));

    let err = register(store, "/", ImageConfig::new("/data/raw.zarr"))
        .await
        .unwrap_err();
    match err {
        LoadError::Redirect { url, .. } => {
            assert!(url.starts_with("https://ome.github.io/ome-ngff-validator/"));
            assert!(url.contains("raw.zarr"));
        }
        other => panic!("expected redirect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_group_without_multiscales_is_schema_error() {
    let store = InMemoryStore::new("memory://empty").with_group("/", json!({"note": "nothing here"}));

    let err = register(store, "/", ImageConfig::new("/data/empty.zarr"))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Schema(_)));
}

#[tokio::test]
async fn test_missing_node_is_store_error() {
    let err = register(
        InMemoryStore::new("memory://none"),
        "/missing",
        ImageConfig::new("/data/none.zarr"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LoadError::Store(_)));
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_query_config_overrides_channels() {
    let config = ImageConfig::from_query(concat!(
        "source=/data/bare.zarr",
        "&names=[%22nuclei%22,%22membrane%22]",
        "&colors=[%22FF00FF%22,%2200FFFF%22]",
        "&visibilities=[true,true]",
        "&contrast_limits=[[0,10],[5,20]]"
    ))
    .unwrap();
    let store = Arc::new(bare_multiscales_store());
    let loader = DatasetLoader::new(store.clone());
    let mut registry = ImageRegistry::new();
    registry.load_with(&loader, "/", config).await.unwrap();

    // supplied limits mean nothing is sampled
    assert_eq!(store.read_count(), 0);

    let router = create_router(
        TileService::new(registry),
        RouterConfig::new().with_tracing(false),
    );
    let (_, json) = get_json(router.clone(), "/images/bare").await;
    let channels = json["channels"].as_array().unwrap();
    assert_eq!(channels[0]["name"], "nuclei");
    assert_eq!(channels[1]["color"], "00FFFF");
    assert_eq!(channels[1]["contrast_limits"], json!([5.0, 20.0]));

    let (_, json) = get_json(router, "/images/bare/layer").await;
    assert_eq!(json["layer_props"]["colors"], json!([[255, 0, 255], [0, 255, 255]]));
    assert_eq!(json["layer_props"]["selections"], json!([[0, 0, 0], [1, 0, 0]]));
}

#[tokio::test]
async fn test_mismatched_config_length_is_configuration_error() {
    let mut config = ImageConfig::new("/data/bare.zarr");
    config.visibilities = Some(vec![true, false, true]);

    let err = register(bare_multiscales_store(), "/", config)
        .await
        .unwrap_err();
    match err {
        LoadError::Configuration(message) => assert!(message.contains("visibilities")),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_channel_axis_out_of_range_is_configuration_error() {
    let mut config = ImageConfig::new("/data/bare.zarr");
    config.channel_axis = Some(5);

    let err = register(bare_multiscales_store(), "/", config)
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Configuration(_)));
}

// =============================================================================
// Contrast Sampling
// =============================================================================

#[tokio::test]
async fn test_contrast_limits_sampled_from_lowest_level() {
    let store = ome_pyramid_store("memory://sampled").with_group(
        "/",
        json!({"multiscales": multiscales_attrs(2, 0.5)}),
    );
    let store = Arc::new(store);
    let loader = DatasetLoader::new(store.clone());
    let data = loader
        .load("/", &ImageConfig::new("/data/sampled.zarr"))
        .await
        .unwrap();

    // level 1 holds every other row and column of level 0
    assert_eq!(
        data.contrast_limits,
        vec![Some([0.0, 90.0]), Some([1000.0, 1090.0])]
    );
    assert!(store.reads().iter().all(|(path, _)| path == "/1"));
}

#[tokio::test]
async fn test_duplicate_sources_get_unique_ids() {
    let loader = DatasetLoader::new(Arc::new(bare_multiscales_store()));
    let mut registry = ImageRegistry::new();

    let first = registry
        .load_with(&loader, "/", ImageConfig::new("/data/bare.zarr"))
        .await
        .unwrap();
    let second = registry
        .load_with(&loader, "/", ImageConfig::new("/other/bare.zarr"))
        .await
        .unwrap();

    assert_eq!(first, "bare");
    assert_eq!(second, "bare-2");
    assert_eq!(registry.len(), 2);
}
