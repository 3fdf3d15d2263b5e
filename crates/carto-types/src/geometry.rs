use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::position::Position;

/// Reference earth circumference in meters (40 000 km).
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_000.0 * 1000.0;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371.0 * 1000.0;

/// Meters per degree along a meridian.
pub const DEG_AVG_DISTANCE_M: f64 = EARTH_CIRCUMFERENCE_M / 360.0;

/// Geometry model of a layer, fixed at creation.
///
/// - `Flat`: plain Euclidean plane, distances in coordinate units.
/// - `FlatWrap`: Euclidean plane wrapping at the world edges.
/// - `Spherical` / `Geoidal`: geodetic coordinates, distances in meters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Flat,
    FlatWrap,
    Spherical,
    #[serde(alias = "ellipsoidal")]
    Geoidal,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::FlatWrap => "flatwrap",
            Self::Spherical => "spherical",
            Self::Geoidal => "geoidal",
        }
    }

    /// Whether coordinates wrap around the world edges.
    pub fn wraps(&self) -> bool {
        !matches!(self, Self::Flat)
    }

    /// Whether distances are geodetic (meters) rather than planar units.
    pub fn is_geodetic(&self) -> bool {
        matches!(self, Self::Spherical | Self::Geoidal)
    }
}

impl FromStr for LayerKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "flatwrap" => Ok(Self::FlatWrap),
            "spherical" => Ok(Self::Spherical),
            "geoidal" | "ellipsoidal" => Ok(Self::Geoidal),
            other => Err(TypeError::UnknownLayerKind(other.to_string())),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance approximation used by geodetic layers, ordered roughly from most
/// accurate to cheapest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceFormula {
    Haversine,
    #[serde(alias = "greatcircle")]
    GreatCircle,
    Fast,
    #[serde(alias = "romboid")]
    Rhomboid,
}

impl DistanceFormula {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Haversine => "haversine",
            Self::GreatCircle => "great_circle",
            Self::Fast => "fast",
            Self::Rhomboid => "rhomboid",
        }
    }
}

impl FromStr for DistanceFormula {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "haversine" => Ok(Self::Haversine),
            "great_circle" | "greatcircle" => Ok(Self::GreatCircle),
            "fast" => Ok(Self::Fast),
            "rhomboid" | "romboid" => Ok(Self::Rhomboid),
            other => Err(TypeError::UnknownDistanceFormula(other.to_string())),
        }
    }
}

impl fmt::Display for DistanceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A layer's geometry model and distance formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub kind: LayerKind,
    pub formula: DistanceFormula,
}

impl Geometry {
    pub fn new(kind: LayerKind, formula: DistanceFormula) -> Self {
        Self { kind, formula }
    }

    /// Distance between two positions: meters for geodetic layers,
    /// coordinate units for flat layers.
    pub fn distance(&self, a: Position, b: Position) -> f64 {
        match self.kind {
            LayerKind::Flat => flat_distance(a, b),
            LayerKind::FlatWrap => flatwrap_distance(a, b),
            LayerKind::Spherical | LayerKind::Geoidal => match self.formula {
                DistanceFormula::Haversine => haversine_distance(a, b),
                DistanceFormula::GreatCircle => great_circle_distance(a, b),
                DistanceFormula::Fast => fast_distance(a, b),
                DistanceFormula::Rhomboid => rhomboid_distance(a, b),
            },
        }
    }

    /// Name of the metric reported in layer listings.
    pub fn accuracy_label(&self) -> &'static str {
        if self.kind.is_geodetic() {
            self.formula.as_str()
        } else {
            "euclidean"
        }
    }

    /// Half-extents in degrees of the candidate rect around `center` for a
    /// radius search. The longitude extent widens with latitude; at the poles
    /// it degenerates to the full world span.
    pub fn degree_radius(&self, center: Position, radius: f64) -> (f64, f64) {
        if !self.kind.is_geodetic() {
            return (radius, radius);
        }
        let dlat = radius / DEG_AVG_DISTANCE_M;
        let scale = (center.latitude.to_radians().cos() * DEG_AVG_DISTANCE_M).abs();
        let dlon = if scale > f64::EPSILON {
            (radius / scale).min(360.0)
        } else {
            360.0
        };
        (dlat, dlon)
    }

    /// Convert a degree span pair to the layer's distance unit. Used for
    /// cluster radius reporting.
    pub fn span_distance(&self, dlat: f64, dlon: f64) -> f64 {
        let avg = (dlat.abs() + dlon.abs()) / 2.0;
        if self.kind.is_geodetic() {
            avg * DEG_AVG_DISTANCE_M
        } else {
            avg
        }
    }
}

fn flat_distance(a: Position, b: Position) -> f64 {
    let dlat = b.latitude - a.latitude;
    let dlon = b.longitude - a.longitude;
    (dlat * dlat + dlon * dlon).sqrt()
}

fn flatwrap_distance(a: Position, b: Position) -> f64 {
    let mut dlat = (b.latitude - a.latitude).abs();
    if dlat > 180.0 {
        dlat = 360.0 - dlat;
    }
    let mut dlon = (b.longitude - a.longitude).abs();
    if dlon > 180.0 {
        dlon = 360.0 - dlon;
    }
    (dlat * dlat + dlon * dlon).sqrt()
}

fn haversine_distance(a: Position, b: Position) -> f64 {
    let half_dlat = (b.latitude - a.latitude).to_radians() / 2.0;
    let half_dlon = (b.longitude - a.longitude).to_radians() / 2.0;
    let h = half_dlat.sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * half_dlon.sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

fn great_circle_distance(a: Position, b: Position) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let cos_arc = lat_a.sin() * lat_b.sin() + lat_a.cos() * lat_b.cos() * dlon.cos();
    let d = EARTH_RADIUS_M * cos_arc.clamp(-1.0, 1.0).acos();
    // The arccosine loses precision on near-identical positions.
    if d < 10.0 {
        fast_distance(a, b)
    } else {
        d
    }
}

fn fast_distance(a: Position, b: Position) -> f64 {
    let k = a.latitude.to_radians().cos();
    let dlon = k * (b.longitude - a.longitude);
    let dlat = b.latitude - a.latitude;
    DEG_AVG_DISTANCE_M * (dlon * dlon + dlat * dlat).sqrt()
}

fn rhomboid_distance(a: Position, b: Position) -> f64 {
    let k = a.latitude.to_radians().cos();
    let dlon = k * (b.longitude - a.longitude);
    let dlat = b.latitude - a.latitude;
    DEG_AVG_DISTANCE_M * (dlon.abs() + dlat.abs())
}
