//! Builds projected ward and facility layers from raw WGS84 inputs.

use std::{collections::BTreeMap, path::Path};

use geo::{BoundingRect, Coord, MapCoords, Point, Rect};
use log::{info, warn};
use serde_json::Value;

use crate::{
    Error,
    config::AnalysisConfig,
    model::{Attributes, Facility, ServiceCategory, Ward},
    projection::UtmZone,
    store::{read_feature_collection, wards_from_collection},
};

pub const WARDS_FILE: &str = "wards.geojson";

const LONGITUDE_COLUMNS: [&str; 3] = ["longitude", "lon", "lng"];
const LATITUDE_COLUMNS: [&str; 2] = ["latitude", "lat"];

/// Projected layers ready to be written to the store
#[derive(Debug, Clone)]
pub struct ProjectedLayers {
    pub zone: UtmZone,
    pub wards: Vec<Ward>,
    /// Categories whose CSV was missing are absent from the map
    pub facilities: BTreeMap<ServiceCategory, Vec<Facility>>,
}

/// Reads `wards.geojson` and the facility CSVs from `raw_dir` and projects
/// them to the configured zone.
///
/// # Errors
///
/// Fails when the ward file is missing or malformed, or when the ward count
/// differs from the configured expectation. Missing facility files only
/// produce a warning.
pub fn build_layers(raw_dir: &Path, config: &AnalysisConfig) -> Result<ProjectedLayers, Error> {
    let ward_path = raw_dir.join(WARDS_FILE);
    if !ward_path.is_file() {
        return Err(Error::InvalidData(format!(
            "Ward boundaries not found at {}",
            ward_path.display()
        )));
    }
    let raw_wards = wards_from_collection(read_feature_collection(&ward_path)?)?;
    config.wards.check_count(raw_wards.len())?;

    let zone = match config.utm_zone()? {
        Some(zone) => zone,
        None => {
            let zone = zone_for_wards(&raw_wards)?;
            info!("Derived UTM zone {} from ward boundaries", zone.crs_name());
            zone
        }
    };

    let wards: Vec<Ward> = raw_wards
        .into_iter()
        .map(|ward| Ward {
            boundary: zone.project_geometry(&ward.boundary),
            ..ward
        })
        .collect();
    info!("Loaded {} wards from {}", wards.len(), ward_path.display());

    let mut facilities = BTreeMap::new();
    for category in ServiceCategory::ALL {
        let path = raw_dir.join(category.csv_name());
        if !path.is_file() {
            warn!(
                "{} not found; skipping the {category} layer",
                path.display()
            );
            continue;
        }
        let points = read_facility_csv(&path, category, &zone)?;
        info!("Loaded {} {category} facilities", points.len());
        facilities.insert(category, points);
    }

    Ok(ProjectedLayers {
        zone,
        wards,
        facilities,
    })
}

/// Reads facility points from a CSV with `longitude` and `latitude` columns.
///
/// Other columns are kept as string attributes. Rows with unparseable
/// coordinates are skipped with a warning.
pub fn read_facility_csv(
    path: &Path,
    category: ServiceCategory,
    zone: &UtmZone,
) -> Result<Vec<Facility>, Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let find = |candidates: &[&str]| {
        headers.iter().position(|header| {
            candidates
                .iter()
                .any(|candidate| header.trim().eq_ignore_ascii_case(candidate))
        })
    };
    let (Some(lon_col), Some(lat_col)) = (find(&LONGITUDE_COLUMNS), find(&LATITUDE_COLUMNS)) else {
        return Err(Error::InvalidData(format!(
            "{} needs longitude and latitude columns",
            path.display()
        )));
    };

    let mut facilities = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        let lon = record.get(lon_col).and_then(|v| v.trim().parse::<f64>().ok());
        let lat = record.get(lat_col).and_then(|v| v.trim().parse::<f64>().ok());
        let (Some(lon), Some(lat)) = (lon, lat) else {
            skipped += 1;
            continue;
        };
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            skipped += 1;
            continue;
        }

        let attributes: Attributes = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(col, _)| *col != lon_col && *col != lat_col)
            .map(|(_, (key, value))| (key.trim().to_string(), Value::from(value)))
            .collect();

        facilities.push(Facility {
            category,
            geometry: zone.project_point(Point::new(lon, lat)),
            attributes,
        });
    }

    if skipped > 0 {
        warn!(
            "Skipped {skipped} rows with invalid coordinates in {}",
            path.display()
        );
    }
    Ok(facilities)
}

/// UTM zone containing the centre of the wards' WGS84 extent
pub fn zone_for_wards(wards: &[Ward]) -> Result<UtmZone, Error> {
    let extent = lon_lat_extent(wards)
        .ok_or_else(|| Error::InvalidData("Ward boundaries are empty".to_string()))?;
    let centre = extent.center();
    Ok(UtmZone::for_lon_lat(centre.x, centre.y))
}

fn lon_lat_extent(wards: &[Ward]) -> Option<Rect<f64>> {
    wards
        .iter()
        .filter_map(|ward| ward.boundary.bounding_rect())
        .reduce(union)
}

fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// WGS84 bounding box of projected wards, grown by `buffer` degrees
pub fn wards_lon_lat_bbox(wards: &[Ward], zone: &UtmZone, buffer: f64) -> Option<Rect<f64>> {
    let extent = wards
        .iter()
        .filter_map(|ward| {
            ward.boundary
                .map_coords(|coord| zone.unproject(coord))
                .bounding_rect()
        })
        .reduce(union)?;
    Some(Rect::new(
        Coord {
            x: extent.min().x - buffer,
            y: extent.min().y - buffer,
        },
        Coord {
            x: extent.max().x + buffer,
            y: extent.max().y + buffer,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::WardConfig;

    const TWO_WARDS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"ward_id": "A", "ward_name": "Alpha"},
             "geometry": {"type": "Polygon", "coordinates":
                [[[75.00, 15.00], [75.01, 15.00], [75.01, 15.01], [75.00, 15.01], [75.00, 15.00]]]}},
            {"type": "Feature", "properties": {"ward_id": "B"},
             "geometry": {"type": "MultiPolygon", "coordinates":
                [[[[75.01, 15.00], [75.02, 15.00], [75.02, 15.01], [75.01, 15.01], [75.01, 15.00]]]]}}
        ]
    }"#;

    fn config_for(count: usize) -> AnalysisConfig {
        AnalysisConfig {
            wards: WardConfig {
                expected_count: Some(count),
            },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn builds_projected_layers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WARDS_FILE), TWO_WARDS).unwrap();
        fs::write(
            dir.path().join("hospitals.csv"),
            "name,latitude,longitude\nCity Hospital,15.005,75.005\nBroken,abc,75.0\n",
        )
        .unwrap();

        let layers = build_layers(dir.path(), &config_for(2)).unwrap();
        assert_eq!(layers.zone.epsg(), 32643);
        assert_eq!(layers.wards.len(), 2);
        assert_eq!(layers.wards[0].name.as_deref(), Some("Alpha"));
        // about 1.07 km by 1.1 km
        let area = layers.wards[0].area_sqkm();
        assert!(area > 1.0 && area < 1.3, "{area}");

        let hospitals = &layers.facilities[&ServiceCategory::Hospital];
        assert_eq!(hospitals.len(), 1);
        assert_eq!(hospitals[0].attributes["name"], Value::from("City Hospital"));
        assert!(!layers.facilities.contains_key(&ServiceCategory::School));
    }

    #[test]
    fn ward_count_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WARDS_FILE), TWO_WARDS).unwrap();
        assert!(matches!(
            build_layers(dir.path(), &config_for(19)),
            Err(Error::WardCount {
                expected: 19,
                found: 2
            })
        ));
    }

    #[test]
    fn missing_ward_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            build_layers(dir.path(), &config_for(2)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn zone_is_derived_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WARDS_FILE), TWO_WARDS).unwrap();
        let mut config = config_for(2);
        config.projection.utm_zone = None;
        let layers = build_layers(dir.path(), &config).unwrap();
        assert_eq!(layers.zone.number(), 43);
        assert!(layers.zone.is_northern());
    }

    #[test]
    fn bbox_round_trips_through_projection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WARDS_FILE), TWO_WARDS).unwrap();
        let layers = build_layers(dir.path(), &config_for(2)).unwrap();
        let bbox = wards_lon_lat_bbox(&layers.wards, &layers.zone, 0.01).unwrap();
        assert!((bbox.min().x - 74.99).abs() < 1e-5);
        assert!((bbox.max().y - 15.02).abs() < 1e-5);
    }

    #[test]
    fn csv_requires_coordinate_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schools.csv");
        fs::write(&path, "name,x,y\nA,1,2\n").unwrap();
        let zone = UtmZone::new(43, true).unwrap();
        assert!(matches!(
            read_facility_csv(&path, ServiceCategory::School, &zone),
            Err(Error::InvalidData(_))
        ));
    }
}
