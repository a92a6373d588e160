//! Fixed-resolution hexagonal tiling of the earth.
//!
//! Points are projected with the Lambert cylindrical equal-area projection
//! and bucketed into pointy-top hexagons, so every cell at a resolution
//! covers the same ground area. Edge lengths shrink by `sqrt(7)` per
//! resolution step, starting from ~1108 km at resolution 0.

mod hex;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use self::hex::{Axial, axial_at, center_of};

/// Resolution used for territory claims (~174 m hexagon edge).
pub const RESOLUTION: u8 = 9;

pub const MAX_RESOLUTION: u8 = 15;

const EARTH_RADIUS_M: f64 = 6_371_007.181;
const RES0_EDGE_M: f64 = 1_107_712.591;

const AXIS_BITS: u32 = 28;
const AXIS_OFFSET: i64 = 1 << (AXIS_BITS - 1);
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;
const ID_HEX_DIGITS: usize = 15;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("resolution {0} above {MAX_RESOLUTION}")]
    Resolution(u8),
    #[error("malformed cell id {0:?}")]
    MalformedId(String),
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Identifier of one hexagon at one resolution.
///
/// Packs the resolution (4 bits) and the axial coordinates (28 bits each,
/// offset binary) into the low 60 bits of a `u64`. Rendered as 15 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn pack(resolution: u8, hex: Axial) -> Self {
        let q = (hex.q + AXIS_OFFSET) as u64 & AXIS_MASK;
        let r = (hex.r + AXIS_OFFSET) as u64 & AXIS_MASK;
        CellId(((resolution as u64) << (2 * AXIS_BITS)) | (q << AXIS_BITS) | r)
    }

    fn axial(self) -> Axial {
        let q = ((self.0 >> AXIS_BITS) & AXIS_MASK) as i64 - AXIS_OFFSET;
        let r = (self.0 & AXIS_MASK) as i64 - AXIS_OFFSET;
        Axial { q, r }
    }

    pub fn resolution(self) -> u8 {
        (self.0 >> (2 * AXIS_BITS)) as u8
    }

    /// Centre of the hexagon. Longitude is always in `[-180, 180)`.
    pub fn center(self) -> GeoPoint {
        let (x, y) = center_of(self.axial(), edge_length_m(self.resolution()));
        let latitude = (y / EARTH_RADIUS_M).clamp(-1.0, 1.0).asin().to_degrees();
        // seam cells straddle -180 and their centre can land just west of it
        let longitude = ((x / EARTH_RADIUS_M).to_degrees() + 180.0).rem_euclid(360.0) - 180.0;
        GeoPoint { latitude, longitude }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$x}", self.0, width = ID_HEX_DIGITS)
    }
}

impl FromStr for CellId {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_HEX_DIGITS || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GridError::MalformedId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(CellId)
            .map_err(|_| GridError::MalformedId(s.to_string()))
    }
}

impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hexagon edge length in metres at `resolution`.
pub fn edge_length_m(resolution: u8) -> f64 {
    RES0_EDGE_M / 7f64.sqrt().powi(resolution as i32)
}

/// Cell enclosing `point` at `resolution`.
pub fn cell_for(point: GeoPoint, resolution: u8) -> Result<CellId, GridError> {
    if resolution > MAX_RESOLUTION {
        return Err(GridError::Resolution(resolution));
    }
    let GeoPoint { latitude, mut longitude } = point;
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(GridError::Latitude(latitude));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(GridError::Longitude(longitude));
    }
    if longitude == 180.0 {
        longitude = -180.0;
    }

    let x = EARTH_RADIUS_M * longitude.to_radians();
    let y = EARTH_RADIUS_M * latitude.to_radians().sin();
    let hex = axial_at(x, y, edge_length_m(resolution));
    Ok(CellId::pack(resolution, hex))
}
