//! End to end conversion of a source image array to an OME-Zarr image.
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::axis::{Axis, NDIM};
use crate::metadata::{
    CanonicalImageGeometry, ParseOptions, parse_metadata, source_metadata_document,
};
use crate::ome::{ChannelRange, OmeAttributes};
use crate::pyramid::{ChunkPolicy, DEFAULT_TILE_SIZE, Pyramid, plan_levels};
use crate::storage::{DestinationStore, SourceDataType, SourceImage, write_batched};
use crate::{Error, Result};

/// Extension appended to destination base names.
pub const OME_ZARR_EXTENSION: &str = "ome.zarr";

/// Number of resolution levels written.
pub const LEVEL_COUNT: usize = 1;

pub const DEFAULT_BATCH_SIZE: u64 = 4;

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;

/// Everything needed to run a conversion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConvertConfig {
    /// Root of the source store.
    pub source_path: PathBuf,
    /// Path of the image array within the source store.
    #[serde(default = "default_source_array_path")]
    pub source_array_path: String,
    /// Root of the destination store.
    pub destination_path: PathBuf,
    #[serde(default = "default_image_name")]
    pub image_name: String,
    /// Timepoints read and written per batch; bounds peak memory.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Upper bound on the y/x chunk extent.
    #[serde(default = "default_tile_size")]
    pub tile_size: u64,
    /// Gzip level of the written chunks, or [None] for raw chunks.
    #[serde(default = "default_compression_level")]
    pub compression_level: Option<u32>,
    /// Replace an existing destination.
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub parse: ParseOptions,
}

fn default_source_array_path() -> String {
    "/".into()
}

fn default_image_name() -> String {
    "image".into()
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_tile_size() -> u64 {
    DEFAULT_TILE_SIZE
}

fn default_compression_level() -> Option<u32> {
    Some(DEFAULT_COMPRESSION_LEVEL)
}

impl ConvertConfig {
    pub fn new(
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
        image_name: impl Into<String>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            source_array_path: default_source_array_path(),
            destination_path: destination_path.into(),
            image_name: image_name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            tile_size: DEFAULT_TILE_SIZE,
            compression_level: default_compression_level(),
            overwrite: false,
            parse: ParseOptions::default(),
        }
    }

    /// Destination path for a base name, e.g. `output` becomes `output.ome.zarr`.
    pub fn destination_for(base_name: impl AsRef<Path>) -> PathBuf {
        let mut name = base_name.as_ref().as_os_str().to_owned();
        name.push(".");
        name.push(OME_ZARR_EXTENSION);
        PathBuf::from(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        if self.tile_size == 0 {
            return Err(Error::config("tile size must be positive"));
        }
        if self.image_name.trim().is_empty() {
            return Err(Error::config("image name must not be empty"));
        }
        let source = resolve_path(&self.source_path)?;
        let destination = resolve_path(&self.destination_path)?;
        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(Error::config(format!(
                "source {} and destination {} overlap",
                source.display(),
                destination.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path`, with links resolved along the part of it that exists.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |resolved, name| resolved.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return Ok(absolute.clone()),
        }
    }
}

/// Summary of a completed conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub geometry: CanonicalImageGeometry,
    pub pyramid: Pyramid,
    pub source_data_type: SourceDataType,
    /// Value range of each channel, as written to the display windows.
    pub channel_ranges: Vec<ChannelRange>,
}

fn prepare_destination(config: &ConvertConfig) -> Result<()> {
    let path = &config.destination_path;
    if !path.exists() {
        return Ok(());
    }
    if !config.overwrite {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("destination {} already exists", path.display()),
        )));
    }
    warn!("removing existing destination {}", path.display());
    if path.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Convert the image described by `config`.
///
/// Metadata parsing, data type and geometry checks all complete before the
/// destination is touched. A failure while writing leaves a partially
/// written destination which must be removed before retrying.
pub fn convert(config: &ConvertConfig) -> Result<Conversion> {
    config.validate()?;
    info!(
        "converting {} to {}",
        config.source_path.display(),
        config.destination_path.display()
    );

    let source = SourceImage::open(&config.source_path, &config.source_array_path)?;
    let document = source_metadata_document(source.attributes())?;
    let geometry = parse_metadata(document, &config.parse)?;

    let shape = source.shape().to_vec();
    if shape.len() != NDIM {
        return Err(Error::geometry(format!(
            "expected a {NDIM}-dimensional (t, c, z, y, x) source, got shape {shape:?}"
        )));
    }
    let n_channels = shape[Axis::C.index()];
    if geometry.channel_count() as u64 != n_channels {
        return Err(Error::metadata(format!(
            "metadata lists {} channels but the channel axis has extent {n_channels}",
            geometry.channel_count()
        )));
    }
    let source_data_type = source.data_type()?;
    info!(
        "source has shape {shape:?} and data type {}, writing float32",
        source_data_type.name()
    );

    let policy = ChunkPolicy {
        tile_size: config.tile_size,
    };
    let pyramid = plan_levels(&shape, &geometry.scaling_vector, LEVEL_COUNT, &policy)?;

    prepare_destination(config)?;
    let destination = DestinationStore::create(
        &config.destination_path,
        &pyramid,
        config.compression_level,
    )?;
    let base = destination
        .level(0)
        .ok_or_else(|| Error::geometry("destination has no base level"))?;
    let channel_ranges = write_batched(&source, base, config.batch_size)?;

    destination.verify(&pyramid)?;
    let ome = OmeAttributes::new(&config.image_name, &geometry, &pyramid, &channel_ranges);
    destination.write_metadata(ome.to_attributes()?)?;
    info!(
        "wrote image `{}` with level shapes {:?} and chunk shapes {:?}",
        config.image_name,
        pyramid.level_shapes(),
        pyramid.level_chunk_shapes()
    );

    Ok(Conversion {
        geometry,
        pyramid,
        source_data_type,
        channel_ranges,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn config_defaults() {
        let config: ConvertConfig = serde_json::from_value(json!({
            "source_path": "in.zarr",
            "destination_path": "out.ome.zarr"
        }))
        .unwrap();
        assert_eq!(config, ConvertConfig::new("in.zarr", "out.ome.zarr", "image"));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.compression_level, Some(DEFAULT_COMPRESSION_LEVEL));
        assert_eq!(config.parse.unit_defaults.space, "micrometer");
    }

    #[test]
    fn config_overrides() {
        let config: ConvertConfig = serde_json::from_value(json!({
            "source_path": "in.zarr",
            "destination_path": "out.ome.zarr",
            "compression_level": null,
            "parse": {"missing_unit": "reject", "unit_defaults": {"time_declared": "millisecond"}}
        }))
        .unwrap();
        assert_eq!(config.compression_level, None);
        assert_eq!(config.parse.unit_defaults.time_declared, "millisecond");
        assert_eq!(config.parse.unit_defaults.time_absent, "minute");
    }

    #[test]
    fn destination_extension() {
        assert_eq!(
            ConvertConfig::destination_for("output"),
            PathBuf::from("output.ome.zarr")
        );
        assert_eq!(
            ConvertConfig::destination_for("data/run1"),
            PathBuf::from("data/run1.ome.zarr")
        );
    }

    #[test]
    fn invalid_configs() {
        let base = ConvertConfig::new("in.zarr", "out.ome.zarr", "image");
        assert!(base.validate().is_ok());
        for config in [
            ConvertConfig {
                batch_size: 0,
                ..base.clone()
            },
            ConvertConfig {
                tile_size: 0,
                ..base.clone()
            },
            ConvertConfig {
                image_name: " ".into(),
                ..base.clone()
            },
            ConvertConfig::new("same", "same", "image"),
            ConvertConfig::new("in.zarr", "./in.zarr", "image"),
            ConvertConfig::new("in.zarr", "in.zarr/out.ome.zarr", "image"),
            ConvertConfig::new("out.ome.zarr/raw.zarr", "out.ome.zarr", "image"),
        ] {
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }
    }
}
