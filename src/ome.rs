//! OME-NGFF image metadata written to the destination root group.
//!
//! See <https://ngff.openmicroscopy.org/0.5/>.
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::axis::{Axis, AxisType};
use crate::metadata::CanonicalImageGeometry;
use crate::pyramid::Pyramid;

/// OME-NGFF version written by this crate.
pub const NGFF_VERSION: &str = "0.5";

/// Root group attributes of an OME-Zarr image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmeAttributes {
    pub ome: OmeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmeMetadata {
    pub version: String,
    pub multiscales: Vec<Multiscale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omero: Option<Omero>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub axes: Vec<OmeAxis>,
    /// Ordered from highest to lowest resolution.
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmeAxis {
    pub name: String,
    #[serde(rename = "type")]
    pub axis_type: AxisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Path of the level array relative to the image group.
    pub path: String,
    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
}

/// Rendering hints for viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omero {
    pub name: String,
    pub version: String,
    pub channels: Vec<OmeroChannel>,
    pub rdefs: Rdefs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmeroChannel {
    pub label: String,
    pub color: String,
    pub active: bool,
    pub coefficient: f64,
    pub family: String,
    pub inverted: bool,
    pub window: Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub min: f64,
    pub max: f64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rdefs {
    pub default_t: u64,
    pub default_z: u64,
    pub model: String,
}

/// Running minimum and maximum of the values in one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ChannelRange {
    /// Whether no finite value has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Include a value; NaN and infinities are ignored.
    pub fn include(&mut self, value: f32) {
        if value.is_finite() {
            let value = f64::from(value);
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }
}

impl From<ChannelRange> for Window {
    fn from(range: ChannelRange) -> Self {
        let (min, max) = if range.is_empty() {
            (0.0, 0.0)
        } else {
            (range.min, range.max)
        };
        Window {
            min,
            max,
            start: min,
            end: max,
        }
    }
}

impl OmeAttributes {
    /// Describe an image whose levels follow `pyramid`.
    ///
    /// Channels without an entry in `ranges` get an empty display window.
    pub fn new(
        image_name: &str,
        geometry: &CanonicalImageGeometry,
        pyramid: &Pyramid,
        ranges: &[ChannelRange],
    ) -> Self {
        let axis_order = geometry.axis_order();
        let axes = axis_order
            .iter()
            .map(|&axis| OmeAxis {
                name: axis.letter().to_string(),
                axis_type: axis.axis_type(),
                unit: geometry.unit(axis).map(str::to_string),
            })
            .collect();

        let datasets = (0..pyramid.level_count())
            .map(|level| {
                let factors = pyramid.downsampling(level);
                let scale = axis_order
                    .iter()
                    .map(|&axis| geometry.scale(axis) * factors[axis.index()])
                    .collect();
                Dataset {
                    path: level.to_string(),
                    coordinate_transformations: vec![CoordinateTransformation::Scale { scale }],
                }
            })
            .collect();

        let channels = geometry
            .channel_names
            .iter()
            .zip(&geometry.channel_colors)
            .enumerate()
            .map(|(idx, (label, color))| OmeroChannel {
                label: label.clone(),
                color: color.clone(),
                active: true,
                coefficient: 1.0,
                family: "linear".into(),
                inverted: false,
                window: ranges.get(idx).copied().unwrap_or_default().into(),
            })
            .collect();

        let omero = Omero {
            name: image_name.to_string(),
            version: NGFF_VERSION.to_string(),
            channels,
            rdefs: Rdefs {
                default_t: 0,
                default_z: pyramid.base().shape[Axis::Z.index()] / 2,
                model: "color".into(),
            },
        };

        Self {
            ome: OmeMetadata {
                version: NGFF_VERSION.to_string(),
                multiscales: vec![Multiscale {
                    name: Some(image_name.to_string()),
                    axes,
                    datasets,
                }],
                omero: Some(omero),
            },
        }
    }

    /// Serialize into a group attribute map.
    pub fn to_attributes(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(crate::Error::metadata(format!(
                "OME metadata serialized to a non-object: {other}"
            ))),
        }
    }

    pub fn from_attributes(
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(
            attributes.clone(),
        ))?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::metadata::{ParseOptions, parse_metadata};
    use crate::pyramid::{ChunkPolicy, plan_levels};

    fn geometry() -> CanonicalImageGeometry {
        let raw = json!({
            "channels": [{"label": "DAPI"}, {"label": "GFP"}],
            "axes": [
                {"name": "z", "type": "space", "scale": 2.0},
                {"name": "y", "type": "space", "scale": 0.5, "unit": "nanometer"},
                {"name": "x", "type": "space", "scale": 0.5, "unit": "nanometer"}
            ]
        });
        parse_metadata(&raw, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn describes_geometry() {
        let geom = geometry();
        let pyramid = plan_levels(
            &[3, 2, 5, 64, 64],
            &geom.scaling_vector,
            1,
            &ChunkPolicy::default(),
        )
        .unwrap();
        let mut range = ChannelRange::default();
        range.include(2.0);
        range.include(f32::NAN);
        range.include(10.0);
        let attrs = OmeAttributes::new("cells", &geom, &pyramid, &[range]);

        let ms = &attrs.ome.multiscales[0];
        let names: Vec<_> = ms.axes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["t", "c", "z", "y", "x"]);
        assert_eq!(ms.axes[0].unit.as_deref(), Some("minute"));
        assert_eq!(ms.axes[1].unit, None);
        assert_eq!(ms.axes[2].unit.as_deref(), Some("micrometer"));
        assert_eq!(ms.axes[4].unit.as_deref(), Some("nanometer"));
        assert_eq!(ms.datasets.len(), 1);
        assert_eq!(ms.datasets[0].path, "0");
        assert_eq!(
            ms.datasets[0].coordinate_transformations,
            vec![CoordinateTransformation::Scale {
                scale: vec![1.0, 1.0, 2.0, 0.5, 0.5]
            }]
        );

        let omero = attrs.ome.omero.as_ref().unwrap();
        assert_eq!(omero.channels.len(), 2);
        assert_eq!(omero.channels[1].label, "GFP");
        assert_eq!(omero.channels[1].color, "00FF00");
        assert_eq!(omero.channels[0].window.min, 2.0);
        assert_eq!(omero.channels[0].window.end, 10.0);
        assert_eq!(omero.channels[1].window.max, 0.0);
        assert_eq!(omero.rdefs.default_z, 2);
    }

    #[test]
    fn attribute_layout() {
        let geom = geometry();
        let pyramid = plan_levels(
            &[1, 2, 1, 8, 8],
            &[1.0, 1.0, 1.0, 0.5, 0.5],
            2,
            &ChunkPolicy::default(),
        )
        .unwrap();
        let attrs = OmeAttributes::new("img", &geom, &pyramid, &[]);
        let map = attrs.to_attributes().unwrap();
        let value = serde_json::Value::Object(map.clone());
        assert_eq!(value["ome"]["version"], json!("0.5"));
        assert_eq!(
            value["ome"]["multiscales"][0]["axes"][1],
            json!({"name": "c", "type": "channel"})
        );
        assert_eq!(
            value["ome"]["multiscales"][0]["datasets"][1],
            json!({
                "path": "1",
                "coordinateTransformations": [{"type": "scale", "scale": [1.0, 1.0, 2.0, 1.0, 1.0]}]
            })
        );
        assert_eq!(value["ome"]["omero"]["rdefs"]["defaultT"], json!(0));
        assert_eq!(OmeAttributes::from_attributes(&map).unwrap(), attrs);
    }
}
