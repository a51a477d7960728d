//! Conversion of axis-labelled (t, c, z, y, x) microscopy Zarr arrays to OME-Zarr.
pub mod axis;
pub mod convert;
mod error;
pub mod metadata;
pub mod ome;
pub mod pyramid;
pub mod storage;

pub use zarrs;

pub use convert::{Conversion, ConvertConfig, convert};
pub use error::{Error, Result};
