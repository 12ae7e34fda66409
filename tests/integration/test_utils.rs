//! Test utilities for integration tests.
//!
//! Fixture stores (in memory and on disk), service builders and HTTP helpers.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use ngff_streamer::dataset::{DatasetLoader, ImageConfig};
use ngff_streamer::pixel::FrameScheduler;
use ngff_streamer::store::{ArrayData, InMemoryStore};
use ngff_streamer::tile::{ImageRegistry, TileService};
use ngff_streamer::{create_router, RouterConfig};

// =============================================================================
// In-Memory Fixtures
// =============================================================================

/// Value of a pixel in the two-channel fixture pyramid at full resolution.
pub fn pyramid_value(c: u64, y: u64, x: u64) -> u16 {
    (c * 1000 + y * 10 + x) as u16
}

fn level_data(channels: u64, height: u64, width: u64, step: u64) -> ArrayData {
    let mut values = Vec::with_capacity((channels * height * width) as usize);
    for c in 0..channels {
        for y in 0..height {
            for x in 0..width {
                values.push(pyramid_value(c, y * step, x * step));
            }
        }
    }
    ArrayData::Uint16(values)
}

/// Multiscale attributes for a `c, y, x` pyramid with `levels` levels.
pub fn multiscales_attrs(levels: usize, base_scale_um: f64) -> Value {
    let datasets: Vec<Value> = (0..levels)
        .map(|i| {
            let s = base_scale_um * (1u64 << i) as f64;
            json!({
                "path": i.to_string(),
                "coordinateTransformations": [{"type": "scale", "scale": [1.0, s, s]}]
            })
        })
        .collect();
    json!([{
        "version": "0.4",
        "axes": [
            {"name": "c", "type": "channel"},
            {"name": "y", "type": "space", "unit": "micrometer"},
            {"name": "x", "type": "space", "unit": "micrometer"}
        ],
        "datasets": datasets
    }])
}

/// Two-channel OME pyramid at `/`: level 0 is 10 x 12 with 4 x 4 chunks,
/// level 1 is 5 x 6. Channel 1 is inactive.
pub fn ome_pyramid_store(identifier: &str) -> InMemoryStore {
    InMemoryStore::new(identifier)
        .with_group(
            "/",
            json!({
                "multiscales": multiscales_attrs(2, 0.5),
                "omero": {
                    "name": "fixture",
                    "channels": [
                        {"label": "DAPI", "color": "0000FF", "window": {"start": 0, "end": 1500}},
                        {"label": "GFP", "color": "00FF00", "active": false,
                         "window": {"start": 1000, "end": 2000}}
                    ]
                }
            }),
        )
        .with_array("/0", vec![2, 10, 12], vec![1, 4, 4], level_data(2, 10, 12, 1))
        .with_array("/1", vec![2, 5, 6], vec![1, 4, 4], level_data(2, 5, 6, 2))
}

/// Build a tile service holding one image loaded from `path` in `store`.
pub async fn service_for(
    store: Arc<InMemoryStore>,
    path: &str,
    config: ImageConfig,
    scheduler: Option<Arc<dyn FrameScheduler>>,
) -> TileService {
    let mut loader = DatasetLoader::new(store);
    if let Some(scheduler) = scheduler {
        loader = loader.with_scheduler(scheduler);
    }
    let mut registry = ImageRegistry::new();
    registry
        .load_with(&loader, path, config)
        .await
        .expect("fixture should load");
    TileService::new(registry)
}

/// Router serving the OME fixture as image id `fixture`.
pub async fn fixture_router() -> Router {
    let store = Arc::new(ome_pyramid_store("memory://fixture"));
    let service = service_for(store, "/", ImageConfig::new("/data/fixture.zarr"), None).await;
    create_router(service, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// HTTP Helpers
// =============================================================================

pub async fn get(router: Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

pub async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = get(router, uri).await;
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Decode a little-endian `uint16` body.
pub fn u16_values(body: &[u8]) -> Vec<u16> {
    body.chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

// =============================================================================
// On-Disk Zarr v2 Fixtures
// =============================================================================

fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Write an uncompressed `<u2` Zarr v2 array with chunk keys `c.y.x`.
///
/// Edge chunks are written at full chunk size, padded with zeros.
fn write_v2_array(dir: &Path, shape: [u64; 3], chunks: [u64; 3], value: impl Fn(u64, u64, u64) -> u16) {
    std::fs::create_dir_all(dir).unwrap();
    write_json(
        &dir.join(".zarray"),
        &json!({
            "zarr_format": 2,
            "shape": shape,
            "chunks": chunks,
            "dtype": "<u2",
            "compressor": null,
            "fill_value": 0,
            "filters": null,
            "order": "C"
        }),
    );

    let grid: Vec<u64> = (0..3).map(|i| shape[i].div_ceil(chunks[i])).collect();
    for gc in 0..grid[0] {
        for gy in 0..grid[1] {
            for gx in 0..grid[2] {
                let mut bytes = Vec::new();
                for c in 0..chunks[0] {
                    for y in 0..chunks[1] {
                        for x in 0..chunks[2] {
                            let (c, y, x) = (gc * chunks[0] + c, gy * chunks[1] + y, gx * chunks[2] + x);
                            let v = if c < shape[0] && y < shape[1] && x < shape[2] {
                                value(c, y, x)
                            } else {
                                0
                            };
                            bytes.extend_from_slice(&v.to_le_bytes());
                        }
                    }
                }
                std::fs::write(dir.join(format!("{}.{}.{}", gc, gy, gx)), bytes).unwrap();
            }
        }
    }
}

/// Write the OME fixture pyramid as a Zarr v2 group at `dir`.
pub fn write_v2_pyramid(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    write_json(&dir.join(".zgroup"), &json!({"zarr_format": 2}));
    write_json(
        &dir.join(".zattrs"),
        &json!({
            "multiscales": multiscales_attrs(2, 0.5),
            "omero": {
                "channels": [
                    {"label": "DAPI", "color": "0000FF", "window": {"start": 0, "end": 1500}},
                    {"label": "GFP", "color": "00FF00", "window": {"start": 1000, "end": 2000}}
                ]
            }
        }),
    );
    write_v2_array(&dir.join("0"), [2, 10, 12], [1, 4, 4], pyramid_value);
    write_v2_array(&dir.join("1"), [2, 5, 6], [1, 4, 4], |c, y, x| {
        pyramid_value(c, y * 2, x * 2)
    });
}
