//! NGFF Streamer - tiled pixel access for OME-NGFF / Zarr pyramids.
//!
//! This binary loads the configured datasets and starts the HTTP server.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ngff_streamer::{
    config::{Cli, Command, InspectConfig, ServeConfig},
    dataset::DatasetLoader,
    init_layer_state,
    server::{create_router, RouterConfig},
    store::ZarrStore,
    tile::{ImageRegistry, TileService},
    NextTick,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let image_configs = match config.image_configs() {
        Ok(configs) => configs,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("NGFF Streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Datasets: {}", image_configs.len());
    match config.frame_interval_ms {
        Some(ms) => info!("  Batching: flush every {}ms", ms),
        None => info!("  Batching: flush on next tick"),
    }
    info!("  Cache max-age: {}s", config.cache_max_age);
    info!("  Max raster: {} pixels", config.max_raster_pixels);

    info!("");
    info!("Loading datasets...");
    let scheduler = config.scheduler();
    let mut registry = ImageRegistry::new();
    for image_config in image_configs {
        let source = image_config.source.clone();
        match registry.load_source(image_config, scheduler.clone()).await {
            Ok(id) => info!("  {} -> {}", source, id),
            Err(e) => warn!("  Failed to load {}: {}", source, e),
        }
    }

    if registry.is_empty() {
        error!("No dataset could be loaded");
        return ExitCode::FAILURE;
    }

    let tile_service = TileService::new(registry);
    let router_config = build_router_config(&config);
    let router = create_router(tile_service, router_config);

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/images", addr);
    info!("    curl http://{}/images/<image_id>", addr);
    info!("");
    info!("  Fetch raw tile pixels:");
    info!("    curl -OJ http://{}/tiles/<image_id>/0/0/0", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "ngff_streamer=debug,tower_http=debug"
    } else {
        "ngff_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_max_raster_pixels(config.max_raster_pixels);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let image_config = match config.image_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (store, path) = match ZarrStore::for_source(&image_config.source) {
        Ok(opened) => opened,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let loader = DatasetLoader::new(Arc::new(store)).with_scheduler(Arc::new(NextTick));

    let kind = match loader.classify(&path, &image_config.source).await {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let kind_name = kind.name();

    let data = match loader.load_kind(kind, &image_config).await {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        let layer = match init_layer_state("inspect", &data) {
            Ok(layer) => layer,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        match serde_json::to_string_pretty(&layer) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", image_config.source);
    println!("═════════════════════════════════");
    println!("Layout: {}", kind_name);
    if let Some(ref name) = data.name {
        println!("Name:   {}", name);
    }
    println!("Axes:   {}", data.axis_labels.join(", "));
    println!();

    println!("Levels:");
    println!("───────");
    for (i, level) in data.loader.iter().enumerate() {
        let (tiles_x, tiles_y) = level.tile_count();
        print!(
            "  {}: {} {:?} {}x{} tiles of {} ({}x{})",
            i,
            level.path(),
            level.shape(),
            tiles_x,
            tiles_y,
            level.tile_size(),
            level.width(),
            level.height(),
        );
        match level.pixel_size() {
            Some(size) => println!(" {:.1}x{:.1} nm/px", size.x, size.y),
            None => println!(),
        }
    }
    println!();

    let dtype = data.loader.first().map(|l| l.dtype().as_str()).unwrap_or("");
    println!("Channels:");
    println!("─────────");
    for i in 0..data.channel_count() {
        let limits = match data.contrast_limits.get(i).copied().flatten() {
            Some([lo, hi]) => format!("[{}, {}]", lo, hi),
            None => "-".to_string(),
        };
        println!(
            "  {} {:<16} {} {} {}",
            if data.visibilities[i] { "●" } else { "○" },
            data.names.get(i).map(String::as_str).unwrap_or(""),
            data.colors.get(i).map(String::as_str).unwrap_or(""),
            dtype,
            limits,
        );
    }

    if !data.labels.is_empty() {
        println!();
        println!("Labels:");
        println!("───────");
        for label in &data.labels {
            println!("  {} ({} levels)", label.name, label.loader.len());
        }
    }

    if let Some(ref grid) = data.grid {
        println!();
        println!(
            "Grid: {} rows x {} columns, {} images",
            grid.rows,
            grid.columns,
            grid.loaders.len()
        );
    }

    ExitCode::SUCCESS
}
