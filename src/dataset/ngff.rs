//! OME loaders: omero channel metadata, label overlays, plates and wells.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channels::{
    GridLayout, GridLoader, LabelSource, LayerDefaults, ModelMatrix, SourceData, WHITE,
};
use crate::error::LoadError;
use crate::ome::{resolve_attrs, Axis, ImageLabel, Multiscale, Omero, Plate, Well};
use crate::pixel::{PixelSource, PixelSourceOptions};
use crate::store::{join_path, ArrayHandle, GroupNode, StoreNode};

use super::classify::parse_key;
use super::levels::{build_pixel_sources, guess_tile_size, load_levels, resolve_axes_and_channel};
use super::{channel_source, AxisResolution, DatasetLoader, ImageConfig};

/// First field of a grid: its metadata and lowest-resolution level.
struct FieldTemplate {
    dataset_path: String,
    array: ArrayHandle,
    axes: Option<Vec<Axis>>,
    multiscales: Vec<Multiscale>,
    omero: Option<Omero>,
}

/// One grid cell before its array is opened.
struct Cell {
    name: String,
    image_path: String,
    row: usize,
    col: usize,
}

/// Channel settings from `omero` metadata, with config overrides for
/// name, model matrix, opacity and colormap.
fn omero_source(
    config: &ImageConfig,
    loader: Vec<PixelSource>,
    resolution: &AxisResolution,
    omero: &Omero,
    fallback_name: Option<String>,
) -> Result<SourceData, LoadError> {
    let base = loader
        .first()
        .ok_or_else(|| LoadError::Schema("image has no pyramid levels".to_string()))?;
    let shape = base.shape();

    let extent = match resolution.channel_axis {
        Some(axis) => shape.get(axis).copied().unwrap_or(1) as usize,
        None => 1,
    };
    if omero.channels.len() != extent {
        return Err(LoadError::Schema(format!(
            "omero lists {} channels but {} has {} along the channel axis",
            omero.channels.len(),
            base.path(),
            extent
        )));
    }

    let mut selection = vec![0; shape.len()];
    if let Some(rdefs) = &omero.rdefs {
        for (axis, value) in [("t", rdefs.default_t), ("z", rdefs.default_z)] {
            let index = resolution.labels.iter().position(|l| l == axis);
            if let (Some(index), Some(value)) = (index, value) {
                selection[index] = value.min(shape[index].saturating_sub(1));
            }
        }
    }

    let channels = &omero.channels;
    Ok(SourceData {
        name: config
            .name
            .clone()
            .or_else(|| omero.name.clone())
            .or(fallback_name),
        channel_axis: resolution.channel_axis,
        colors: channels
            .iter()
            .map(|c| match c.color.as_deref() {
                Some(color) => format!("#{}", color.trim_start_matches('#')),
                None => WHITE.to_string(),
            })
            .collect(),
        names: channels
            .iter()
            .enumerate()
            .map(|(i, c)| c.label.clone().unwrap_or_else(|| i.to_string()))
            .collect(),
        contrast_limits: channels
            .iter()
            .map(|c| c.window.as_ref().map(|w| [w.start, w.end]))
            .collect(),
        visibilities: channels.iter().map(|c| c.active.unwrap_or(true)).collect(),
        model_matrix: ModelMatrix::parse(config.model_matrix.as_ref()),
        defaults: LayerDefaults {
            selection,
            colormap: config.colormap.clone().unwrap_or_default(),
            opacity: config.opacity.unwrap_or(1.0),
        },
        axis_labels: resolution.labels.clone(),
        labels: Vec::new(),
        grid: None,
        loader,
    })
}

impl DatasetLoader {
    async fn open_array(&self, path: &str) -> Result<ArrayHandle, LoadError> {
        match self.store.open(path).await? {
            StoreNode::Array(array) => Ok(array),
            StoreNode::Group(_) => Err(LoadError::Schema(format!("{} is not an array", path))),
        }
    }

    async fn open_group(&self, path: &str) -> Result<GroupNode, LoadError> {
        match self.store.open(path).await? {
            StoreNode::Group(group) => Ok(group),
            StoreNode::Array(_) => Err(LoadError::Schema(format!("{} is not a group", path))),
        }
    }

    // -------------------------------------------------------------------------
    // OME Multiscales
    // -------------------------------------------------------------------------

    pub(super) async fn load_ome(
        &self,
        config: &ImageConfig,
        group: &GroupNode,
        multiscales: Vec<Multiscale>,
        omero: &Omero,
    ) -> Result<SourceData, LoadError> {
        let (levels, axes) = load_levels(self.store.as_ref(), group, &multiscales).await?;
        let first = levels
            .first()
            .ok_or_else(|| LoadError::Schema("image has no pyramid levels".to_string()))?;
        let resolution =
            resolve_axes_and_channel(config, axes.as_deref(), first, self.axis_strategy.as_ref())?;
        let tile_size = guess_tile_size(first);
        let fallback_name = multiscales.first().and_then(|m| m.name.clone());

        let loader = build_pixel_sources(
            &self.store,
            levels,
            &resolution.labels,
            Some(Arc::new(multiscales)),
            tile_size,
            &self.scheduler,
        )?;

        let mut data = omero_source(config, loader, &resolution, omero, fallback_name)?;
        data.labels = self.load_labels(group, data.model_matrix).await;
        Ok(data)
    }

    /// Label images under `<group>/labels`. Broken labels are skipped.
    async fn load_labels(&self, group: &GroupNode, model_matrix: ModelMatrix) -> Vec<LabelSource> {
        let labels_path = join_path(&group.path, "labels");
        let labels_group = match self.open_group(&labels_path).await {
            Ok(g) => g,
            Err(e) => {
                debug!(path = %labels_path, error = %e, "No label images");
                return Vec::new();
            }
        };

        let names: Vec<String> = match parse_key(
            &resolve_attrs(&labels_group.attrs),
            "labels",
            &labels_group.path,
        ) {
            Ok(names) => names.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Ignoring label list");
                return Vec::new();
            }
        };

        let mut labels = Vec::with_capacity(names.len());
        for name in names {
            match self.load_label(&labels_group, &name, model_matrix).await {
                Ok(label) => labels.push(label),
                Err(e) => warn!(label = %name, error = %e, "Skipping label image"),
            }
        }
        labels
    }

    async fn load_label(
        &self,
        labels_group: &GroupNode,
        name: &str,
        model_matrix: ModelMatrix,
    ) -> Result<LabelSource, LoadError> {
        let group = self.open_group(&join_path(&labels_group.path, name)).await?;
        let attrs = resolve_attrs(&group.attrs);
        let multiscales: Vec<Multiscale> = parse_key(&attrs, "multiscales", &group.path)?
            .ok_or_else(|| {
                LoadError::Schema(format!("label {} is missing multiscales", group.path))
            })?;
        let image_label: ImageLabel =
            parse_key(&attrs, "image-label", &group.path)?.unwrap_or_default();

        let (levels, axes) = load_levels(self.store.as_ref(), &group, &multiscales).await?;
        let first = levels
            .first()
            .ok_or_else(|| LoadError::Schema(format!("label {} has no levels", group.path)))?;
        let resolution = resolve_axes_and_channel(
            &ImageConfig::new(group.path.clone()),
            axes.as_deref(),
            first,
            self.axis_strategy.as_ref(),
        )?;
        let tile_size = guess_tile_size(first);
        let loader = build_pixel_sources(
            &self.store,
            levels,
            &resolution.labels,
            Some(Arc::new(multiscales)),
            tile_size,
            &self.scheduler,
        )?;

        Ok(LabelSource {
            name: name.to_string(),
            loader,
            colors: image_label.colors,
            model_matrix,
        })
    }

    // -------------------------------------------------------------------------
    // Plates and Wells
    // -------------------------------------------------------------------------

    async fn open_well(&self, path: &str) -> Result<Well, LoadError> {
        let group = self.open_group(path).await?;
        parse_key(&resolve_attrs(&group.attrs), "well", &group.path)?
            .ok_or_else(|| LoadError::Schema(format!("{} is missing well metadata", path)))
    }

    async fn open_template(&self, image_path: &str) -> Result<FieldTemplate, LoadError> {
        let group = self.open_group(image_path).await?;
        let attrs = resolve_attrs(&group.attrs);
        let multiscales: Vec<Multiscale> = parse_key(&attrs, "multiscales", &group.path)?
            .ok_or_else(|| {
                LoadError::Schema(format!("field {} is missing multiscales", group.path))
            })?;
        let omero = parse_key(&attrs, "omero", &group.path)?;

        let multiscale = multiscales
            .first()
            .ok_or_else(|| LoadError::Schema(format!("field {} has no multiscales", group.path)))?;
        let dataset_path = multiscale
            .datasets
            .last()
            .map(|d| d.path.clone())
            .ok_or_else(|| LoadError::Schema(format!("field {} has no datasets", group.path)))?;
        let axes = multiscale.declared_axes();
        let array = self.open_array(&join_path(image_path, &dataset_path)).await?;

        Ok(FieldTemplate {
            dataset_path,
            array,
            axes,
            multiscales,
            omero,
        })
    }

    pub(super) async fn load_plate(
        &self,
        config: &ImageConfig,
        group: &GroupNode,
        plate: &Plate,
    ) -> Result<SourceData, LoadError> {
        let first_well = plate
            .wells
            .first()
            .ok_or_else(|| LoadError::Schema(format!("plate {} has no wells", group.path)))?;
        let well_path = join_path(&group.path, &first_well.path);
        let well = self.open_well(&well_path).await?;
        let image = well
            .images
            .first()
            .ok_or_else(|| LoadError::Schema(format!("well {} has no images", well_path)))?;
        let template = self.open_template(&join_path(&well_path, &image.path)).await?;

        let cells = plate
            .wells
            .iter()
            .filter_map(|w| match plate.well_position(w) {
                Some((row, col)) => Some(Cell {
                    name: w.path.clone(),
                    image_path: join_path(&join_path(&group.path, &w.path), &image.path),
                    row,
                    col,
                }),
                None => {
                    warn!(well = %w.path, "Well does not match plate rows and columns");
                    None
                }
            })
            .collect();

        self.load_grid(
            config,
            template,
            cells,
            (plate.rows.len(), plate.columns.len()),
            plate.name.clone(),
        )
        .await
    }

    pub(super) async fn load_well(
        &self,
        config: &ImageConfig,
        group: &GroupNode,
        well: &Well,
    ) -> Result<SourceData, LoadError> {
        let first = well
            .images
            .first()
            .ok_or_else(|| LoadError::Schema(format!("well {} has no images", group.path)))?;
        let template = self.open_template(&join_path(&group.path, &first.path)).await?;

        let n = well.images.len();
        let columns = (n as f64).sqrt().ceil() as usize;
        let rows = n.div_ceil(columns);
        let cells = well
            .images
            .iter()
            .enumerate()
            .map(|(i, image)| Cell {
                name: image.path.clone(),
                image_path: join_path(&group.path, &image.path),
                row: i / columns,
                col: i % columns,
            })
            .collect();

        self.load_grid(config, template, cells, (rows, columns), None).await
    }

    /// Open the lowest level of every cell. Cells that fail to open are
    /// skipped; channel settings come from the first field.
    async fn load_grid(
        &self,
        config: &ImageConfig,
        template: FieldTemplate,
        cells: Vec<Cell>,
        (rows, columns): (usize, usize),
        fallback_name: Option<String>,
    ) -> Result<SourceData, LoadError> {
        let resolution = resolve_axes_and_channel(
            config,
            template.axes.as_deref(),
            &template.array,
            self.axis_strategy.as_ref(),
        )?;
        let tile_size = guess_tile_size(&template.array);
        let multiscales = Arc::new(template.multiscales);

        let mut loaders = Vec::with_capacity(cells.len());
        for cell in cells {
            let path = join_path(&cell.image_path, &template.dataset_path);
            let array = match self.open_array(&path).await {
                Ok(array) => array,
                Err(e) => {
                    warn!(cell = %cell.name, error = %e, "Skipping unreadable grid cell");
                    continue;
                }
            };
            let options = PixelSourceOptions::new(resolution.labels.clone(), tile_size)
                .with_multiscales(Some(Arc::clone(&multiscales)))
                .with_scheduler(Arc::clone(&self.scheduler));
            match PixelSource::new(Arc::clone(&self.store), array, options) {
                Ok(loader) => loaders.push(GridLoader {
                    name: cell.name,
                    row: cell.row,
                    col: cell.col,
                    loader,
                }),
                Err(e) => warn!(cell = %cell.name, error = %e, "Skipping grid cell"),
            }
        }

        let first = loaders
            .first()
            .map(|cell| cell.loader.clone())
            .ok_or_else(|| LoadError::Schema("no grid cells could be opened".to_string()))?;
        debug!(cells = loaders.len(), rows, columns, "Loaded grid");

        let mut data = match &template.omero {
            Some(omero) => omero_source(config, vec![first], &resolution, omero, fallback_name)?,
            None => {
                let mut data = channel_source(config, vec![first], resolution.channel_axis).await?;
                data.name = data.name.or(fallback_name);
                data
            }
        };
        data.grid = Some(GridLayout {
            loaders,
            rows,
            columns,
        });
        Ok(data)
    }
}
