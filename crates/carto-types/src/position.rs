use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// Coordinate space covered by every spatial index. Both axes span
/// [-180, 180): geodetic layers store (latitude, longitude) degrees, flat
/// layers may treat the axes as arbitrary planar units within the same range.
pub const WORLD_BOUNDS: Rect = Rect {
    lat0: -180.0,
    lon0: -180.0,
    lat1: 180.0,
    lon1: 180.0,
};

/// A 2D coordinate: latitude first, longitude second.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Parse a `"lat,lon"` pair. Whitespace around either number is allowed.
    pub fn parse(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| TypeError::InvalidCoordinate(format!("expected \"lat,lon\", got {s:?}")))?;
        let latitude = parse_coordinate(lat)?;
        let longitude = parse_coordinate(lon)?;
        let position = Self {
            latitude,
            longitude,
        };
        position.validate()?;
        Ok(position)
    }

    /// Both components must be finite and within the world bounds.
    pub fn validate(&self) -> Result<()> {
        for (axis, value) in [("latitude", self.latitude), ("longitude", self.longitude)] {
            if !value.is_finite() {
                return Err(TypeError::InvalidCoordinate(format!(
                    "{axis} must be finite, got {value}"
                )));
            }
            if !(-180.0..=180.0).contains(&value) {
                return Err(TypeError::InvalidCoordinate(format!(
                    "{axis} {value} outside [-180, 180]"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

fn parse_coordinate(s: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| TypeError::InvalidCoordinate(format!("not a number: {s:?}")))
}

/// An axis-aligned rectangle. Containment is half-open: a point on the low
/// edge of an axis is inside, a point on the high edge is outside.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub lat0: f64,
    pub lon0: f64,
    pub lat1: f64,
    pub lon1: f64,
}

impl Rect {
    pub fn new(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> Self {
        Self {
            lat0,
            lon0,
            lat1,
            lon1,
        }
    }

    /// Parse `"lat0,lon0,lat1,lon1"` and normalize edge order.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(',');
        let mut edges = [0.0f64; 4];
        for edge in &mut edges {
            let part = parts.next().ok_or_else(|| {
                TypeError::InvalidCoordinate(format!("expected 4 comma-separated numbers, got {s:?}"))
            })?;
            *edge = parse_coordinate(part)?;
        }
        if parts.next().is_some() {
            return Err(TypeError::InvalidCoordinate(format!(
                "expected 4 comma-separated numbers, got {s:?}"
            )));
        }
        let rect = Self::new(edges[0], edges[1], edges[2], edges[3]).normalized();
        Position::new(rect.lat0, rect.lon0).validate()?;
        Position::new(rect.lat1, rect.lon1).validate()?;
        Ok(rect)
    }

    /// Swap any reversed edge pair so that `lat0 <= lat1` and `lon0 <= lon1`.
    pub fn normalized(mut self) -> Self {
        if self.lat0 > self.lat1 {
            std::mem::swap(&mut self.lat0, &mut self.lat1);
        }
        if self.lon0 > self.lon1 {
            std::mem::swap(&mut self.lon0, &mut self.lon1);
        }
        self
    }

    pub fn contains(&self, p: Position) -> bool {
        p.latitude >= self.lat0
            && p.latitude < self.lat1
            && p.longitude >= self.lon0
            && p.longitude < self.lon1
    }

    /// Half-open overlap test between two rects.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.lat0 < other.lat1
            && other.lat0 < self.lat1
            && self.lon0 < other.lon1
            && other.lon0 < self.lon1
    }

    pub fn center(&self) -> Position {
        Position::new(
            (self.lat0 + self.lat1) / 2.0,
            (self.lon0 + self.lon1) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.lat1 - self.lat0
    }

    pub fn lon_span(&self) -> f64 {
        self.lon1 - self.lon0
    }

    /// Split into four quadrants at the median of each axis.
    ///
    /// Layout matches [`Rect::child_index`]: bit 0 selects the high
    /// longitude half, bit 1 the high latitude half.
    pub fn quadrants(&self) -> [Rect; 4] {
        let mid = self.center();
        [
            Rect::new(self.lat0, self.lon0, mid.latitude, mid.longitude),
            Rect::new(self.lat0, mid.longitude, mid.latitude, self.lon1),
            Rect::new(mid.latitude, self.lon0, self.lat1, mid.longitude),
            Rect::new(mid.latitude, mid.longitude, self.lat1, self.lon1),
        ]
    }

    /// Quadrant index for a position, decided purely against the axis
    /// midpoints. Total for any finite position, so points outside this rect
    /// still map to their nearest extreme quadrant.
    pub fn child_index(&self, p: Position) -> usize {
        let mid = self.center();
        let lat_bit = usize::from(p.latitude >= mid.latitude);
        let lon_bit = usize::from(p.longitude >= mid.longitude);
        (lat_bit << 1) | lon_bit
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.lat0, self.lon0, self.lat1, self.lon1)
    }
}
