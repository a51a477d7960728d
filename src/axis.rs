use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of dimensions in the canonical axis order.
pub const NDIM: usize = 5;

/// One of the five canonical image dimensions.
///
/// The declaration order is the canonical axis order (t, c, z, y, x),
/// so sorted collections keyed by [Axis] iterate in array order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    T,
    C,
    Z,
    Y,
    X,
}

/// Physical kind of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    Time,
    Channel,
    Space,
}

impl Axis {
    /// Canonical axis order of every array read or written by this crate.
    pub const ORDER: [Axis; NDIM] = [Axis::T, Axis::C, Axis::Z, Axis::Y, Axis::X];

    /// Axes which carry a physical scale and unit.
    pub const PHYSICAL: [Axis; 4] = [Axis::T, Axis::Z, Axis::Y, Axis::X];

    /// Position of this axis within [Axis::ORDER].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn letter(self) -> &'static str {
        match self {
            Axis::T => "t",
            Axis::C => "c",
            Axis::Z => "z",
            Axis::Y => "y",
            Axis::X => "x",
        }
    }

    pub fn axis_type(self) -> AxisType {
        match self {
            Axis::T => AxisType::Time,
            Axis::C => AxisType::Channel,
            Axis::Z | Axis::Y | Axis::X => AxisType::Space,
        }
    }

    /// Look up an axis by its letter, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "t" => Some(Axis::T),
            "c" => Some(Axis::C),
            "z" => Some(Axis::Z),
            "y" => Some(Axis::Y),
            "x" => Some(Axis::X),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}
