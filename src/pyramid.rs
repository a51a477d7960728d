//! Resolution level and chunk geometry planning.
use serde::{Deserialize, Serialize};

use crate::axis::{Axis, NDIM};
use crate::{Error, Result};

/// Default upper bound on the y/x chunk extent.
pub const DEFAULT_TILE_SIZE: u64 = 512;

/// Array and chunk shape of a single resolution level, in (t, c, z, y, x) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGeometry {
    pub shape: [u64; NDIM],
    pub chunk_shape: [u64; NDIM],
}

impl LevelGeometry {
    /// Number of chunks along each axis.
    pub fn chunk_grid_shape(&self) -> [u64; NDIM] {
        std::array::from_fn(|idx| self.shape[idx].div_ceil(self.chunk_shape[idx]))
    }
}

/// Chunking rules applied to every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Upper bound on the y/x chunk extent.
    pub tile_size: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Chunk shape for an array of the given shape.
    ///
    /// One timepoint and one z-plane per chunk with all channels,
    /// and the y/x extents split into near-equal tiles no larger than `tile_size`.
    pub fn chunk_shape(&self, shape: &[u64; NDIM]) -> [u64; NDIM] {
        let tile = |extent: u64| {
            let n_tiles = extent.div_ceil(self.tile_size);
            extent.div_ceil(n_tiles)
        };
        [
            1,
            shape[Axis::C.index()],
            1,
            tile(shape[Axis::Y.index()]),
            tile(shape[Axis::X.index()]),
        ]
    }
}

/// Geometry of every resolution level, finest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pyramid {
    levels: Vec<LevelGeometry>,
}

impl Pyramid {
    pub fn levels(&self) -> &[LevelGeometry] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The full resolution level.
    pub fn base(&self) -> &LevelGeometry {
        &self.levels[0]
    }

    pub fn level_shapes(&self) -> Vec<[u64; NDIM]> {
        self.levels.iter().map(|l| l.shape).collect()
    }

    pub fn level_chunk_shapes(&self) -> Vec<[u64; NDIM]> {
        self.levels.iter().map(|l| l.chunk_shape).collect()
    }

    /// Ratio of base extent to level extent along each axis.
    pub fn downsampling(&self, level: usize) -> [f64; NDIM] {
        let base = self.base().shape;
        let shape = self.levels[level].shape;
        std::array::from_fn(|idx| base[idx] as f64 / shape[idx] as f64)
    }
}

/// Compute the shape and chunk shape of each resolution level.
///
/// Level 0 is always `base_shape`. Each later level scales the previous
/// level's shape by `scaling_vector`, rounding and clamping to at least 1.
pub fn plan_levels(
    base_shape: &[u64],
    scaling_vector: &[f64; NDIM],
    level_count: usize,
    policy: &ChunkPolicy,
) -> Result<Pyramid> {
    if level_count < 1 {
        return Err(Error::geometry("level count must be at least 1"));
    }
    let base: [u64; NDIM] = base_shape.try_into().map_err(|_| {
        Error::geometry(format!(
            "expected a {NDIM}-dimensional shape, got {base_shape:?}"
        ))
    })?;
    if let Some(axis) = Axis::ORDER.iter().find(|a| base[a.index()] == 0) {
        return Err(Error::geometry(format!(
            "shape {base:?} has zero extent along `{axis}`"
        )));
    }
    if let Some(axis) = Axis::ORDER
        .iter()
        .find(|a| !(scaling_vector[a.index()].is_finite() && scaling_vector[a.index()] > 0.0))
    {
        return Err(Error::geometry(format!(
            "scaling factor {} for `{axis}` is not positive",
            scaling_vector[axis.index()]
        )));
    }
    if policy.tile_size == 0 {
        return Err(Error::geometry("tile size must be positive"));
    }

    let mut shapes = Vec::with_capacity(level_count);
    shapes.push(base);
    for _ in 1..level_count {
        let prev = shapes[shapes.len() - 1];
        let next: [u64; NDIM] = std::array::from_fn(|idx| {
            let scaled = (prev[idx] as f64 * scaling_vector[idx]).round();
            (scaled as u64).max(1)
        });
        shapes.push(next);
    }

    let levels = shapes
        .into_iter()
        .map(|shape| LevelGeometry {
            chunk_shape: policy.chunk_shape(&shape),
            shape,
        })
        .collect();
    Ok(Pyramid { levels })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: [f64; NDIM] = [1.0; NDIM];
    const HALF_YX: [f64; NDIM] = [1.0, 1.0, 1.0, 0.5, 0.5];

    #[test]
    fn single_level_is_base_shape() {
        let base = [2, 3, 1, 10, 10];
        let policy = ChunkPolicy::default();
        for scaling in [UNIT, [0.5; NDIM], [2.5, 1.0, 0.3, 0.65, 0.65]] {
            let pyramid = plan_levels(&base, &scaling, 1, &policy).unwrap();
            assert_eq!(pyramid.level_count(), 1);
            assert_eq!(pyramid.base().shape, base);
        }
    }

    #[test]
    fn chunks_fit_within_shape() {
        let base = [5, 2, 7, 1000, 1537];
        let policy = ChunkPolicy::default();
        let pyramid = plan_levels(&base, &HALF_YX, 4, &policy).unwrap();
        assert_eq!(pyramid.level_chunk_shapes()[0], [1, 2, 1, 500, 385]);
        for level in pyramid.levels() {
            for idx in 0..NDIM {
                assert!(level.chunk_shape[idx] >= 1);
                assert!(level.chunk_shape[idx] <= level.shape[idx]);
            }
            let n_channels = level.shape[Axis::C.index()];
            assert_eq!(level.chunk_shape[Axis::Z.index()], 1);
            assert_eq!(level.chunk_shape[Axis::T.index()], 1);
            assert_eq!(level.chunk_shape[Axis::C.index()], n_channels);
        }
    }

    #[test]
    fn tiles_are_balanced() {
        let policy = ChunkPolicy { tile_size: 512 };
        let shape = [3, 2, 4, 1000, 300];
        assert_eq!(policy.chunk_shape(&shape), [1, 2, 1, 500, 300]);
        let tall = [1, 1, 1, 1536, 1];
        assert_eq!(policy.chunk_shape(&tall), [1, 1, 1, 512, 1]);
        let level = LevelGeometry {
            shape,
            chunk_shape: policy.chunk_shape(&shape),
        };
        assert_eq!(level.chunk_grid_shape(), [3, 1, 4, 2, 1]);
    }

    #[test]
    fn later_levels_are_scaled() {
        let base = [4, 2, 3, 100, 75];
        let policy = ChunkPolicy::default();
        let pyramid = plan_levels(&base, &HALF_YX, 3, &policy).unwrap();
        let expected = vec![base, [4, 2, 3, 50, 38], [4, 2, 3, 25, 19]];
        assert_eq!(pyramid.level_shapes(), expected);
        let factors = [1.0, 1.0, 1.0, 2.0, 75.0 / 38.0];
        assert_eq!(pyramid.downsampling(1), factors);
    }

    #[test]
    fn levels_never_shrink_below_one() {
        let base = [1, 1, 1, 2, 2];
        let policy = ChunkPolicy::default();
        let pyramid = plan_levels(&base, &[0.1; NDIM], 3, &policy).unwrap();
        assert_eq!(pyramid.levels()[2].shape, [1; NDIM]);
    }

    #[test]
    fn invalid_inputs() {
        let policy = ChunkPolicy::default();
        let base = [1, 1, 1, 8, 8];
        assert!(matches!(
            plan_levels(&base, &UNIT, 0, &policy),
            Err(Error::Geometry(_))
        ));
        assert!(matches!(
            plan_levels(&base, &[1.0, 1.0, 0.0, 1.0, 1.0], 1, &policy),
            Err(Error::Geometry(_))
        ));
        assert!(matches!(
            plan_levels(&base, &[1.0, f64::NAN, 1.0, 1.0, 1.0], 1, &policy),
            Err(Error::Geometry(_))
        ));
        assert!(matches!(
            plan_levels(&[1, 0, 1, 8, 8], &UNIT, 1, &policy),
            Err(Error::Geometry(_))
        ));
        assert!(matches!(
            plan_levels(&[8, 8], &UNIT, 1, &policy),
            Err(Error::Geometry(_))
        ));
    }
}
