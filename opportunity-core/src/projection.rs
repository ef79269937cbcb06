//! WGS84 <-> UTM projection on the WGS84 ellipsoid.
//!
//! Distances, areas and snapping all assume planar meters, so every input
//! layer and the road network are projected into one UTM zone before use.

use geo::{Coord, MapCoords, Point};

use crate::Error;

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone (1..=60) and hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    number: u8,
    northern: bool,
}

impl UtmZone {
    pub fn new(number: u8, northern: bool) -> Result<Self, Error> {
        if (1..=60).contains(&number) {
            Ok(Self { number, northern })
        } else {
            Err(Error::InvalidConfig(format!(
                "UTM zone must be within 1..=60, got {number}"
            )))
        }
    }

    /// Zone containing a WGS84 position
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let number = (((lon + 180.0) / 6.0).floor() as i64).rem_euclid(60) + 1;
        Self {
            number: number as u8,
            northern: lat >= 0.0,
        }
    }

    pub const fn number(&self) -> u8 {
        self.number
    }

    pub const fn is_northern(&self) -> bool {
        self.northern
    }

    pub fn epsg(&self) -> u32 {
        let base = if self.northern { 32_600 } else { 32_700 };
        base + u32::from(self.number)
    }

    pub fn crs_name(&self) -> String {
        format!("EPSG:{}", self.epsg())
    }

    /// Parses a WGS84 UTM CRS name such as `EPSG:32643`
    pub fn from_crs_name(name: &str) -> Result<Self, Error> {
        let code: u32 = name
            .trim()
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| Error::InvalidData(format!("Unrecognised CRS '{name}'")))?;
        let (northern, number) = match code {
            32_601..=32_660 => (true, code - 32_600),
            32_701..=32_760 => (false, code - 32_700),
            _ => {
                return Err(Error::InvalidData(format!(
                    "CRS '{name}' is not a WGS84 UTM zone"
                )));
            }
        };
        Self::new(number as u8, northern)
    }

    fn central_meridian(&self) -> f64 {
        f64::from(self.number - 1).mul_add(6.0, -180.0) + 3.0
    }

    /// Projects a lon/lat coordinate (degrees) to easting/northing (meters).
    pub fn project(&self, lon_lat: Coord<f64>) -> Coord<f64> {
        let e2 = FLATTENING * (2.0 - FLATTENING);
        let ep2 = e2 / (1.0 - e2);

        let phi = lon_lat.y.to_radians();
        let lambda = (lon_lat.x - self.central_meridian()).to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();

        let n = SEMI_MAJOR_AXIS / e2.mul_add(-sin_phi * sin_phi, 1.0).sqrt();
        let t = phi.tan().powi(2);
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * lambda;
        let m = meridian_arc(phi, e2);

        let easting = SCALE_FACTOR
            * n
            * (a + (1.0 - t + c) * a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
            + FALSE_EASTING;

        let mut northing = SCALE_FACTOR
            * (m + n
                * phi.tan()
                * (a * a / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
        if !self.northern {
            northing += FALSE_NORTHING_SOUTH;
        }

        Coord {
            x: easting,
            y: northing,
        }
    }

    /// Inverse of [`UtmZone::project`], returning lon/lat degrees.
    pub fn unproject(&self, easting_northing: Coord<f64>) -> Coord<f64> {
        let e2 = FLATTENING * (2.0 - FLATTENING);
        let ep2 = e2 / (1.0 - e2);

        let x = easting_northing.x - FALSE_EASTING;
        let y = if self.northern {
            easting_northing.y
        } else {
            easting_northing.y - FALSE_NORTHING_SOUTH
        };

        let m = y / SCALE_FACTOR;
        let mu = m / (SEMI_MAJOR_AXIS
            * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let j1 = 3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0;
        let j2 = 21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0;
        let j3 = 151.0 * e1.powi(3) / 96.0;
        let j4 = 1097.0 * e1.powi(4) / 512.0;
        let fp = mu
            + j1 * (2.0 * mu).sin()
            + j2 * (4.0 * mu).sin()
            + j3 * (6.0 * mu).sin()
            + j4 * (8.0 * mu).sin();

        let (sin_fp, cos_fp) = fp.sin_cos();
        let c1 = ep2 * cos_fp * cos_fp;
        let t1 = fp.tan().powi(2);
        let r1 = SEMI_MAJOR_AXIS * (1.0 - e2) / e2.mul_add(-sin_fp * sin_fp, 1.0).powf(1.5);
        let n1 = SEMI_MAJOR_AXIS / e2.mul_add(-sin_fp * sin_fp, 1.0).sqrt();
        let d = x / (n1 * SCALE_FACTOR);

        let lat = fp
            - (n1 * fp.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_fp;

        Coord {
            x: self.central_meridian() + lon.to_degrees(),
            y: lat.to_degrees(),
        }
    }

    pub fn project_point(&self, lon_lat: Point<f64>) -> Point<f64> {
        Point::from(self.project(lon_lat.into()))
    }

    /// Projects every coordinate of a geometry
    pub fn project_geometry<G>(&self, geometry: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geometry.map_coords(|coord| self.project(coord))
    }
}

fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR_AXIS
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}
