//! Parsing of the loosely structured source metadata into canonical image geometry.
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisType, NDIM};
use crate::{Error, Result};

/// Attribute key under which the source array keeps its image metadata.
pub const SOURCE_METADATA_KEY: &str = "metadata";

/// Display colours assigned to channels by position.
pub const CHANNEL_COLORS: [&str; 6] = ["FF0000", "00FF00", "0000FF", "FFFF00", "FF00FF", "00FFFF"];

/// Source image metadata, as found under [SOURCE_METADATA_KEY].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Imaging channels, in array order.
    pub channels: Option<Vec<ChannelDescriptor>>,
    /// Physical axes; the channel axis is never listed here.
    pub axes: Option<Vec<AxisDescriptor>>,
    /// Acquisition timestamps, only consulted when a time axis is declared.
    #[serde(default)]
    pub times: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisDescriptor {
    pub name: String,
    /// Either `space` or `time`.
    #[serde(rename = "type")]
    pub axis_type: String,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Units applied when the source metadata does not provide one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitDefaults {
    /// Unit of a space axis, declared or absent.
    pub space: String,
    /// Unit of a declared time axis without a unit.
    pub time_declared: String,
    /// Unit of the time axis when the metadata has no time axis entry.
    pub time_absent: String,
}

impl Default for UnitDefaults {
    fn default() -> Self {
        Self {
            space: "micrometer".into(),
            time_declared: "second".into(),
            time_absent: "minute".into(),
        }
    }
}

/// What to do when a declared axis has no unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingUnit {
    /// Use the matching entry of [UnitDefaults].
    #[default]
    Default,
    /// Fail with [Error::Metadata].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub unit_defaults: UnitDefaults,
    pub missing_unit: MissingUnit,
}

/// Physical description of an image in canonical (t, c, z, y, x) order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalImageGeometry {
    pub channel_names: Vec<String>,
    /// Hexadecimal RGB colour per channel.
    pub channel_colors: Vec<String>,
    /// Physical size of one element along each non-channel axis.
    pub physical_scale: BTreeMap<Axis, f64>,
    pub physical_unit: BTreeMap<Axis, String>,
    /// Per-axis factor used to derive pyramid level shapes.
    pub scaling_vector: [f64; NDIM],
    /// Axes whose scale was not given by the source metadata.
    pub defaulted_scales: BTreeSet<Axis>,
    /// Axes whose unit was not given by the source metadata.
    pub defaulted_units: BTreeSet<Axis>,
}

impl CanonicalImageGeometry {
    /// Axis order of the image and of [Self::scaling_vector].
    pub fn axis_order(&self) -> [Axis; NDIM] {
        Axis::ORDER
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    /// Physical scale of an axis; the channel axis is unitless with scale 1.
    pub fn scale(&self, axis: Axis) -> f64 {
        self.physical_scale.get(&axis).copied().unwrap_or(1.0)
    }

    pub fn unit(&self, axis: Axis) -> Option<&str> {
        self.physical_unit.get(&axis).map(String::as_str)
    }
}

/// Extract the raw metadata document from the source array attributes.
pub fn source_metadata_document(
    attributes: &serde_json::Map<String, serde_json::Value>,
) -> Result<&serde_json::Value> {
    attributes.get(SOURCE_METADATA_KEY).ok_or_else(|| {
        Error::metadata(format!(
            "source attributes have no `{SOURCE_METADATA_KEY}` field"
        ))
    })
}

/// Reduce a raw metadata document to canonical image geometry.
pub fn parse_metadata(
    raw: &serde_json::Value,
    options: &ParseOptions,
) -> Result<CanonicalImageGeometry> {
    let source = SourceMetadata::deserialize(raw)
        .map_err(|e| Error::metadata(format!("could not parse source metadata: {e}")))?;
    CanonicalImageGeometry::from_source(&source, options)
}

fn parse_axis_type(name: &str, axis_type: &str) -> Result<AxisType> {
    match axis_type.trim().to_ascii_lowercase().as_str() {
        "space" => Ok(AxisType::Space),
        "time" => Ok(AxisType::Time),
        other => Err(Error::metadata(format!(
            "axis `{name}` has unsupported type `{other}`"
        ))),
    }
}

fn channel_metadata(source: &SourceMetadata) -> Result<(Vec<String>, Vec<String>)> {
    let channels = source
        .channels
        .as_ref()
        .ok_or_else(|| Error::metadata("missing `channels`"))?;
    if channels.len() > CHANNEL_COLORS.len() {
        return Err(Error::metadata(format!(
            "{} channels exceed the {}-colour channel palette",
            channels.len(),
            CHANNEL_COLORS.len()
        )));
    }
    let names = channels
        .iter()
        .enumerate()
        .map(|(idx, ch)| {
            if ch.label.trim().is_empty() {
                Err(Error::metadata(format!("channel {idx} has an empty label")))
            } else {
                Ok(ch.label.clone())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    let colors = CHANNEL_COLORS[..names.len()]
        .iter()
        .map(|c| c.to_string())
        .collect();
    Ok((names, colors))
}

impl CanonicalImageGeometry {
    pub fn from_source(source: &SourceMetadata, options: &ParseOptions) -> Result<Self> {
        let (channel_names, channel_colors) = channel_metadata(source)?;
        let axes = source
            .axes
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::metadata("missing or empty `axes`"))?;

        let defaults = &options.unit_defaults;
        let mut physical_scale = BTreeMap::new();
        let mut physical_unit = BTreeMap::new();
        for axis in Axis::PHYSICAL {
            physical_scale.insert(axis, 1.0);
            let unit = match axis.axis_type() {
                AxisType::Time => &defaults.time_absent,
                _ => &defaults.space,
            };
            physical_unit.insert(axis, unit.clone());
        }
        let mut defaulted_scales: BTreeSet<Axis> = Axis::PHYSICAL.into_iter().collect();
        let mut defaulted_units = defaulted_scales.clone();
        let mut scaling_vector = [1.0; NDIM];
        let mut declared = BTreeSet::new();

        for desc in axes {
            let axis = Axis::from_name(&desc.name)
                .filter(|a| *a != Axis::C)
                .ok_or_else(|| {
                    Error::metadata(format!(
                        "axis name `{}` is not one of x, y, z, t",
                        desc.name
                    ))
                })?;
            if !declared.insert(axis) {
                return Err(Error::metadata(format!("axis `{axis}` is declared twice")));
            }
            let axis_type = parse_axis_type(&desc.name, &desc.axis_type)?;
            if axis_type != axis.axis_type() {
                return Err(Error::metadata(format!(
                    "axis `{axis}` is declared as {axis_type:?}, expected {:?}",
                    axis.axis_type()
                )));
            }

            let scale = match desc.scale {
                Some(s) if s.is_finite() && s > 0.0 => {
                    defaulted_scales.remove(&axis);
                    s
                }
                Some(s) => {
                    return Err(Error::metadata(format!(
                        "axis `{axis}` has non-positive scale {s}"
                    )));
                }
                None => {
                    info!("axis `{axis}` has no scale; using 1");
                    1.0
                }
            };

            let declared_unit = desc
                .unit
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty());
            let unit = match declared_unit {
                Some(u) => {
                    defaulted_units.remove(&axis);
                    u.to_string()
                }
                None if options.missing_unit == MissingUnit::Reject => {
                    return Err(Error::metadata(format!("axis `{axis}` has no unit")));
                }
                None => {
                    let unit = match axis_type {
                        AxisType::Time => &defaults.time_declared,
                        _ => &defaults.space,
                    };
                    info!("axis `{axis}` has no unit; using `{unit}`");
                    unit.clone()
                }
            };

            physical_scale.insert(axis, scale);
            physical_unit.insert(axis, unit);
            scaling_vector[axis.index()] = scale;
        }

        if declared.contains(&Axis::T) {
            if let [first, second, ..] = source.times.as_slice() {
                let step = second - first;
                if !(step.is_finite() && step > 0.0) {
                    return Err(Error::metadata(format!(
                        "timestamps {first} and {second} do not give a positive time step"
                    )));
                }
                debug!("time step {step} derived from timestamps");
                scaling_vector[Axis::T.index()] = step;
            }
        } else if !source.times.is_empty() {
            debug!("ignoring `times` as no time axis is declared");
        }

        for axis in Axis::PHYSICAL.iter().filter(|a| !declared.contains(*a)) {
            info!(
                "axis `{axis}` absent from metadata; using scale 1 and unit `{}`",
                physical_unit[axis]
            );
        }

        Ok(Self {
            channel_names,
            channel_colors,
            physical_scale,
            physical_unit,
            scaling_vector,
            defaulted_scales,
            defaulted_units,
        })
    }
}
