//! Tests against Zarr v2 datasets written to a temporary directory.
//!
//! Tests verify:
//! - A directory source registers under its file stem
//! - Tile pixels and edge geometry read back from disk
//! - Layout classification and level metadata of on-disk groups

use std::sync::Arc;

use axum::http::StatusCode;

use ngff_streamer::dataset::{DatasetLoader, ImageConfig};
use ngff_streamer::pixel::NextTick;
use ngff_streamer::store::{ChunkStore, StoreNode, ZarrStore};
use ngff_streamer::tile::{ImageRegistry, TileRequest, TileService};
use ngff_streamer::{create_router, RouterConfig};

use super::test_utils::{get, get_json, pyramid_value, u16_values, write_v2_pyramid};

async fn disk_service(dir: &std::path::Path) -> TileService {
    let source = dir.join("image.zarr");
    write_v2_pyramid(&source);

    let mut registry = ImageRegistry::new();
    let id = registry
        .load_source(
            ImageConfig::new(source.display().to_string()),
            Arc::new(NextTick),
        )
        .await
        .unwrap();
    assert_eq!(id, "image");
    TileService::new(registry)
}

#[tokio::test]
async fn test_open_source_resolves_group_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("image.zarr");
    write_v2_pyramid(&source);

    let (store, path) = ZarrStore::for_source(&source).unwrap();
    assert_eq!(path, "/image.zarr");

    match store.open(&path).await.unwrap() {
        StoreNode::Group(group) => assert!(group.attrs.contains_key("multiscales")),
        StoreNode::Array(_) => panic!("expected a group"),
    }
    match store.open("/image.zarr/0").await.unwrap() {
        StoreNode::Array(array) => {
            assert_eq!(array.shape, vec![2, 10, 12]);
            assert_eq!(array.chunks, vec![1, 4, 4]);
        }
        StoreNode::Group(_) => panic!("expected an array"),
    }

    let kind = DatasetLoader::new(Arc::new(store))
        .classify(&path, &source.display().to_string())
        .await
        .unwrap();
    assert_eq!(kind.name(), "ome-multiscales");
}

#[tokio::test]
async fn test_missing_source_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ZarrStore::for_source(dir.path().join("absent.zarr")).is_err());
}

#[tokio::test]
async fn test_tiles_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let service = disk_service(dir.path()).await;

    let tile = service
        .get_tile(TileRequest::new("image", 0, 1, 1))
        .await
        .unwrap();
    assert_eq!((tile.width, tile.height), (4, 4));
    let values = u16_values(&tile.data);
    assert_eq!(values[0], pyramid_value(0, 4, 4));
    assert_eq!(values[15], pyramid_value(0, 7, 7));

    // padded chunks on disk are clipped to the level extent
    let edge = service
        .get_tile(TileRequest::new("image", 0, 2, 2))
        .await
        .unwrap();
    assert_eq!((edge.width, edge.height), (4, 2));
    assert_eq!(u16_values(&edge.data), vec![88, 89, 90, 91, 98, 99, 100, 101]);
}

#[tokio::test]
async fn test_disk_image_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let service = disk_service(dir.path()).await;
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let (status, headers, body) = get(router.clone(), "/tiles/image/1/0/0?selection=1,0,0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-pixel-width"], "4");
    assert_eq!(u16_values(&body)[1], pyramid_value(1, 0, 2));

    let (status, json) = get_json(router, "/images/image").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "ome-multiscales");
    assert_eq!(json["levels"][1]["width"], 6);
    assert_eq!(json["levels"][1]["height"], 5);
    assert_eq!(json["channels"][1]["color"], "#00FF00");
}
