//! Source and destination chunked array stores.
use std::path::Path;
use std::sync::Arc;

use log::debug;
use zarrs::array::codec::GzipCodec;
use zarrs::array::{Array, ArrayBuilder, ArraySubset, DataType, ElementOwned, data_type};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::GroupBuilder;

use crate::axis::{Axis, NDIM};
use crate::ome::ChannelRange;
use crate::pyramid::Pyramid;
use crate::{Error, Result};

/// Element type of a source array which can be coerced to float32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl SourceDataType {
    pub fn from_data_type(data_type: &DataType) -> Result<Self> {
        let candidates = [
            (data_type::bool(), Self::Bool),
            (data_type::int8(), Self::Int8),
            (data_type::int16(), Self::Int16),
            (data_type::int32(), Self::Int32),
            (data_type::int64(), Self::Int64),
            (data_type::uint8(), Self::UInt8),
            (data_type::uint16(), Self::UInt16),
            (data_type::uint32(), Self::UInt32),
            (data_type::uint64(), Self::UInt64),
            (data_type::float32(), Self::Float32),
            (data_type::float64(), Self::Float64),
        ];
        candidates
            .into_iter()
            .find(|(candidate, _)| candidate == data_type)
            .map(|(_, dt)| dt)
            .ok_or_else(|| Error::type_coercion(format!("unsupported data type {data_type:?}")))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

/// Lossy numeric conversion to float32.
trait AsF32: ElementOwned {
    fn as_f32(self) -> f32;
}

macro_rules! impl_as_f32 {
    ($($t:ty),*) => {
        $(
            impl AsF32 for $t {
                fn as_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_as_f32!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl AsF32 for bool {
    fn as_f32(self) -> f32 {
        u8::from(self).into()
    }
}

fn retrieve_as_f32<T: AsF32>(
    array: &Array<FilesystemStore>,
    subset: &ArraySubset,
) -> Result<Vec<f32>> {
    let values: Vec<T> = array
        .retrieve_array_subset(subset)
        .map_err(Error::storage)?;
    Ok(values.into_iter().map(AsF32::as_f32).collect())
}

/// Lazily read source image array.
pub struct SourceImage {
    array: Array<FilesystemStore>,
}

impl SourceImage {
    /// Open the array at `array_path` within the store at `path`.
    ///
    /// Only metadata is read.
    pub fn open(path: &Path, array_path: &str) -> Result<Self> {
        let store = Arc::new(FilesystemStore::new(path).map_err(Error::storage)?);
        let array = Array::open(store, array_path).map_err(Error::storage)?;
        Ok(Self { array })
    }

    pub fn shape(&self) -> &[u64] {
        self.array.shape()
    }

    pub fn attributes(&self) -> &serde_json::Map<String, serde_json::Value> {
        self.array.attributes()
    }

    pub fn data_type(&self) -> Result<SourceDataType> {
        SourceDataType::from_data_type(self.array.data_type())
    }

    /// Read a subset of the array, converting every element to float32.
    pub fn read_f32(&self, subset: &ArraySubset) -> Result<Vec<f32>> {
        match self.data_type()? {
            SourceDataType::Bool => retrieve_as_f32::<bool>(&self.array, subset),
            SourceDataType::Int8 => retrieve_as_f32::<i8>(&self.array, subset),
            SourceDataType::Int16 => retrieve_as_f32::<i16>(&self.array, subset),
            SourceDataType::Int32 => retrieve_as_f32::<i32>(&self.array, subset),
            SourceDataType::Int64 => retrieve_as_f32::<i64>(&self.array, subset),
            SourceDataType::UInt8 => retrieve_as_f32::<u8>(&self.array, subset),
            SourceDataType::UInt16 => retrieve_as_f32::<u16>(&self.array, subset),
            SourceDataType::UInt32 => retrieve_as_f32::<u32>(&self.array, subset),
            SourceDataType::UInt64 => retrieve_as_f32::<u64>(&self.array, subset),
            SourceDataType::Float32 => retrieve_as_f32::<f32>(&self.array, subset),
            SourceDataType::Float64 => retrieve_as_f32::<f64>(&self.array, subset),
        }
    }
}

/// Path of the array holding resolution level `level`.
pub fn level_path(level: usize) -> String {
    format!("/{level}")
}

/// A pyramidal float32 image store.
pub struct DestinationStore {
    store: Arc<FilesystemStore>,
    levels: Vec<Array<FilesystemStore>>,
}

impl DestinationStore {
    /// Create the root group and one empty array per pyramid level.
    ///
    /// Only the base level can be filled, so a pyramid with more than one
    /// level is rejected.
    /// `compression_level` selects gzip compression; [None] writes raw chunks.
    pub fn create(path: &Path, pyramid: &Pyramid, compression_level: Option<u32>) -> Result<Self> {
        if pyramid.level_count() != 1 {
            return Err(Error::geometry(format!(
                "cannot fill {} levels, only the base level is written",
                pyramid.level_count()
            )));
        }
        std::fs::create_dir_all(path)?;
        let store = Arc::new(FilesystemStore::new(path).map_err(Error::storage)?);
        let root = GroupBuilder::new()
            .build(store.clone(), "/")
            .map_err(Error::storage)?;
        root.store_metadata().map_err(Error::storage)?;

        let mut levels = Vec::with_capacity(pyramid.level_count());
        for (idx, level) in pyramid.levels().iter().enumerate() {
            let mut builder = ArrayBuilder::new(
                level.shape.to_vec(),
                level.chunk_shape.to_vec(),
                data_type::float32(),
                0.0f32,
            );
            builder.dimension_names(Some(Axis::ORDER.map(Axis::letter)));
            if let Some(compression_level) = compression_level {
                builder.bytes_to_bytes_codecs(vec![Arc::new(
                    GzipCodec::new(compression_level).map_err(Error::storage)?,
                )]);
            }
            let array = builder
                .build(store.clone(), &level_path(idx))
                .map_err(Error::storage)?;
            array.store_metadata().map_err(Error::storage)?;
            debug!(
                "created level {idx} with shape {:?}, chunk shape {:?} and chunk grid {:?}",
                level.shape,
                level.chunk_shape,
                level.chunk_grid_shape()
            );
            levels.push(array);
        }
        Ok(Self { store, levels })
    }

    pub fn level(&self, level: usize) -> Option<&Array<FilesystemStore>> {
        self.levels.get(level)
    }

    /// Check the stored level arrays against the planned geometry.
    pub fn verify(&self, pyramid: &Pyramid) -> Result<()> {
        if self.levels.len() != pyramid.level_count() {
            return Err(Error::geometry(format!(
                "store has {} levels, expected {}",
                self.levels.len(),
                pyramid.level_count()
            )));
        }
        for (idx, level) in pyramid.levels().iter().enumerate() {
            let array =
                Array::open(self.store.clone(), &level_path(idx)).map_err(Error::storage)?;
            if array.shape() != level.shape.as_slice() {
                return Err(Error::geometry(format!(
                    "level {idx} has shape {:?}, expected {:?}",
                    array.shape(),
                    level.shape
                )));
            }
        }
        Ok(())
    }

    /// Replace the root group attributes.
    pub fn write_metadata(
        &self,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let root = GroupBuilder::new()
            .attributes(attributes)
            .build(self.store.clone(), "/")
            .map_err(Error::storage)?;
        root.store_metadata().map_err(Error::storage)?;
        Ok(())
    }
}

/// Copy `source` into `destination` in batches of `batch_size` timepoints.
///
/// Batches are written in increasing time order, each one read, converted
/// and stored before the next is started.
/// Returns the value range seen in each channel.
pub fn write_batched(
    source: &SourceImage,
    destination: &Array<FilesystemStore>,
    batch_size: u64,
) -> Result<Vec<ChannelRange>> {
    if batch_size == 0 {
        return Err(Error::config("batch size must be positive"));
    }
    let shape: [u64; NDIM] = source.shape().try_into().map_err(|_| {
        Error::geometry(format!(
            "expected a {NDIM}-dimensional source, got shape {:?}",
            source.shape()
        ))
    })?;
    if destination.shape() != shape.as_slice() {
        return Err(Error::geometry(format!(
            "destination shape {:?} does not match source shape {shape:?}",
            destination.shape()
        )));
    }

    let n_t = shape[Axis::T.index()];
    let n_c = shape[Axis::C.index()] as usize;
    let plane_len = (shape[Axis::Z.index()] * shape[Axis::Y.index()] * shape[Axis::X.index()])
        as usize;
    if n_c == 0 || plane_len == 0 {
        return Err(Error::geometry(format!(
            "source shape {shape:?} has an empty axis"
        )));
    }
    let mut ranges = vec![ChannelRange::default(); n_c];

    let mut t_start = 0;
    while t_start < n_t {
        let t_end = (t_start + batch_size).min(n_t);
        let subset = ArraySubset::new_with_ranges(&[
            t_start..t_end,
            0..shape[Axis::C.index()],
            0..shape[Axis::Z.index()],
            0..shape[Axis::Y.index()],
            0..shape[Axis::X.index()],
        ]);
        let values = source.read_f32(&subset)?;
        for (plane_idx, plane) in values.chunks(plane_len).enumerate() {
            let range = &mut ranges[plane_idx % n_c];
            for &value in plane {
                range.include(value);
            }
        }
        destination
            .store_array_subset(&subset, values)
            .map_err(Error::storage)?;
        debug!("wrote timepoints {t_start}..{t_end} of {n_t}");
        t_start = t_end;
    }
    Ok(ranges)
}
