//! API integration tests for tile retrieval, metadata and error handling.
//!
//! Tests verify:
//! - Raw tile and raster bodies and their geometry headers
//! - Selection of non-spatial axes through the query string
//! - Image list, metadata, layer state and calibration endpoints
//! - Error cases (unknown image, invalid level, out-of-bounds tile, bad selection,
//!   oversized raster)

use std::sync::Arc;

use axum::http::StatusCode;

use ngff_streamer::dataset::ImageConfig;
use ngff_streamer::store::{ArrayData, InMemoryStore};
use ngff_streamer::{create_router, RouterConfig};

use super::test_utils::{
    fixture_router, get, get_json, ome_pyramid_store, pyramid_value, service_for, u16_values,
};

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let router = fixture_router().await;
    let (status, headers, body) = get(router, "/tiles/fixture/0/1/0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(headers["cache-control"], "public, max-age=3600");
    assert_eq!(headers["x-pixel-width"], "4");
    assert_eq!(headers["x-pixel-height"], "4");
    assert_eq!(headers["x-pixel-dtype"], "Uint16");

    let values = u16_values(&body);
    assert_eq!(values.len(), 16);
    // row 0, columns 4..8 of channel 0
    assert_eq!(values[..4], [4, 5, 6, 7]);
    assert_eq!(values[4], pyramid_value(0, 1, 4));
}

#[tokio::test]
async fn test_edge_tile_is_clipped() {
    let router = fixture_router().await;
    let (status, headers, body) = get(router, "/tiles/fixture/0/2/2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-width"], "4");
    assert_eq!(headers["x-pixel-height"], "2");
    assert_eq!(u16_values(&body), vec![88, 89, 90, 91, 98, 99, 100, 101]);
}

#[tokio::test]
async fn test_tile_selection_positional_and_named() {
    let router = fixture_router().await;

    let (status, _, body) = get(router.clone(), "/tiles/fixture/0/0/0?selection=1,0,0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(u16_values(&body)[0], pyramid_value(1, 0, 0));

    // {"c":1}
    let (status, _, body) = get(router, "/tiles/fixture/0/0/0?selection=%7B%22c%22%3A1%7D").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(u16_values(&body)[0], pyramid_value(1, 0, 0));
}

#[tokio::test]
async fn test_lower_level_tile() {
    let router = fixture_router().await;
    let (status, headers, body) = get(router, "/tiles/fixture/1/1/1").await;

    assert_eq!(status, StatusCode::OK);
    // level 1 is 6 x 5: tile (1, 1) covers columns 4..6 and row 4
    assert_eq!(headers["x-pixel-width"], "2");
    assert_eq!(headers["x-pixel-height"], "1");
    assert_eq!(
        u16_values(&body),
        vec![pyramid_value(0, 8, 8), pyramid_value(0, 8, 10)]
    );
}

#[tokio::test]
async fn test_raster_retrieval() {
    let router = fixture_router().await;
    let (status, headers, body) = get(router, "/raster/fixture/1?selection=1,0,0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-width"], "6");
    assert_eq!(headers["x-pixel-height"], "5");
    let values = u16_values(&body);
    assert_eq!(values.len(), 30);
    assert_eq!(values[0], pyramid_value(1, 0, 0));
    assert_eq!(values[29], pyramid_value(1, 8, 10));
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let store = Arc::new(InMemoryStore::new("memory://cache").with_array(
        "/img",
        vec![4, 4],
        vec![4, 4],
        ArrayData::Uint8((0..16).collect()),
    ));
    let service = service_for(store, "/img", ImageConfig::new("/data/img.zarr"), None).await;
    let router = create_router(service, RouterConfig::new().with_cache_max_age(60));

    let (status, headers, body) = get(router, "/tiles/img/0/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["cache-control"], "public, max-age=60");
    assert_eq!(headers["x-pixel-dtype"], "Uint8");
    assert_eq!(body.len(), 16);
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_raster_over_pixel_limit_returns_400() {
    let store = Arc::new(ome_pyramid_store("memory://limit"));
    let service = service_for(store, "/", ImageConfig::new("/data/fixture.zarr"), None).await;
    let config = RouterConfig::new().with_tracing(false).with_max_raster_pixels(30);
    let router = create_router(service, config);

    // level 1 is 6 x 5
    let (status, _, body) = get(router.clone(), "/raster/fixture/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(u16_values(&body).len(), 30);

    let (status, json) = get_json(router, "/raster/fixture/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "raster_too_large");
}

#[tokio::test]
async fn test_unknown_image_returns_404() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/tiles/nope/0/0/0").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_invalid_level_returns_400() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/tiles/fixture/2/0/0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_level");
    assert!(json["message"].as_str().unwrap().contains("valid range: 0-1"));
}

#[tokio::test]
async fn test_out_of_bounds_tile_returns_400() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/tiles/fixture/0/3/0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "tile_out_of_bounds");
}

#[tokio::test]
async fn test_unparseable_selection_returns_400() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/tiles/fixture/0/0/0?selection=one,two").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_selection");
}

#[tokio::test]
async fn test_selection_past_axis_extent_returns_400() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/tiles/fixture/0/0/0?selection=5,0,0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_selection");
}

#[tokio::test]
async fn test_failing_store_read_returns_500() {
    let store = Arc::new(
        InMemoryStore::new("memory://failing")
            .with_array("/img", vec![4, 4], vec![4, 4], ArrayData::Uint8(vec![0; 16]))
            .with_failing_array("/img"),
    );
    // uint8 needs no sampling, so loading succeeds
    let service = service_for(store, "/img", ImageConfig::new("/data/img.zarr"), None).await;
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let (status, json) = get_json(router, "/tiles/img/0/0/0").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "fetch_error");
}

// =============================================================================
// Metadata Endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_images_list() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/images").await;

    assert_eq!(status, StatusCode::OK);
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["id"], "fixture");
    assert_eq!(images[0]["kind"], "ome-multiscales");
    assert_eq!(images[0]["level_count"], 2);
    assert_eq!(images[0]["channel_count"], 2);
}

#[tokio::test]
async fn test_image_metadata() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/images/fixture").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "fixture");
    assert_eq!(json["name"], "fixture");
    assert_eq!(json["source"], "/data/fixture.zarr");
    assert_eq!(json["dtype"], "Uint16");
    assert_eq!(json["channel_axis"], 0);
    assert_eq!(json["axis_labels"], serde_json::json!(["c", "y", "x"]));

    let channels = json["channels"].as_array().unwrap();
    assert_eq!(channels[0]["name"], "DAPI");
    assert_eq!(channels[0]["color"], "#0000FF");
    assert_eq!(channels[0]["visible"], true);
    assert_eq!(channels[1]["visible"], false);
    assert_eq!(channels[1]["contrast_limits"], serde_json::json!([1000.0, 2000.0]));

    let levels = json["levels"].as_array().unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0]["width"], 12);
    assert_eq!(levels[0]["height"], 10);
    assert_eq!(levels[0]["tile_size"], 4);
    assert_eq!(levels[0]["tiles_x"], 3);
    assert_eq!(levels[0]["tiles_y"], 3);
    assert_eq!(levels[0]["pixel_size"]["x"], 500.0);
    assert_eq!(levels[1]["path"], "/1");
    assert_eq!(levels[1]["pixel_size"]["y"], 1000.0);
}

#[tokio::test]
async fn test_image_metadata_unknown_image() {
    let router = fixture_router().await;
    let (status, _) = get_json(router, "/images/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_layer_state() {
    let router = fixture_router().await;
    let (status, json) = get_json(router, "/images/fixture/layer").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "multiscale");
    let props = &json["layer_props"];
    assert_eq!(props["id"], "fixture");
    // only the visible channel is carried
    assert_eq!(props["colors"], serde_json::json!([[0, 0, 255]]));
    assert_eq!(props["contrast_limits"], serde_json::json!([[0.0, 1500.0]]));
    assert_eq!(props["selections"], serde_json::json!([[0, 0, 0]]));
}

#[tokio::test]
async fn test_calibration() {
    let router = fixture_router().await;

    let (status, json) = get_json(router.clone(), "/images/fixture/calibration").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pixel_size_nm"], 500.0);
    assert!(json["scale_bar"]["label"].is_string());

    let (_, json) = get_json(router, "/images/fixture/calibration?zoom=-1").await;
    assert_eq!(json["pixel_size_nm"], 1000.0);
}

#[tokio::test]
async fn test_calibration_without_scale_is_null() {
    let store = Arc::new(InMemoryStore::new("memory://bare").with_array(
        "/img",
        vec![4, 4],
        vec![4, 4],
        ArrayData::Uint8(vec![0; 16]),
    ));
    let service = service_for(store, "/img", ImageConfig::new("/data/img.zarr"), None).await;
    let router = create_router(service, RouterConfig::new());

    let (status, json) = get_json(router, "/images/img/calibration").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["pixel_size_nm"].is_null());
    assert!(json["scale_bar"].is_null());
}
