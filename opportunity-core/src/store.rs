//! File-based layer store shared by all pipeline stages.
//!
//! A store is one directory holding named `GeoJSON` layers
//! (`<name>.geojson`), a `manifest.json` describing them, the topological
//! road network and flat result tables. Stages communicate only through it.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, GeometryValue, JsonObject};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    Error,
    model::{Attributes, Facility, ServiceCategory, Ward},
};

/// Fixed layer and file names
pub mod names {
    pub const WARDS: &str = "wards";
    pub const ROADS: &str = "roads";
    pub const WARDS_ACCESSIBILITY: &str = "wards_accessibility";
    pub const WARDS_FINAL_INDEX: &str = "wards_final_index";
    pub const WARDS_LISA: &str = "wards_lisa_hotspots";

    pub const NETWORK_FILE: &str = "network.json";
    pub const OVERPASS_CACHE: &str = "overpass_raw.json";
    pub const ACCESSIBILITY_TABLE: &str = "ward_accessibility_scores.csv";
    pub const INDEX_TABLE: &str = "ward_pca_scores.csv";
    pub const LISA_TABLE: &str = "ward_lisa_clusters.csv";
    pub const SPATIAL_SUMMARY: &str = "spatial_summary.json";
}

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerEntry {
    pub crs: String,
    pub features: usize,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub layers: BTreeMap<String, LayerEntry>,
}

#[derive(Debug, Clone)]
pub struct LayerStore {
    root: PathBuf,
}

impl LayerStore {
    /// Opens a store, creating its directory when needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn layer_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.geojson"))
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layer_path(name).is_file()
    }

    pub fn manifest(&self) -> Result<Manifest, Error> {
        let path = self.file_path(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(Manifest::default());
        }
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    /// Writes a layer, tagging it with its CRS and recording it in the manifest
    pub fn write_layer(
        &self,
        name: &str,
        mut collection: FeatureCollection,
        crs: &str,
    ) -> Result<(), Error> {
        let mut members = collection.foreign_members.take().unwrap_or_default();
        members.insert(
            "crs".to_string(),
            json!({ "type": "name", "properties": { "name": crs } }),
        );
        collection.foreign_members = Some(members);

        let features = collection.features.len();
        let path = self.layer_path(name);
        serde_json::to_writer(BufWriter::new(File::create(&path)?), &collection)?;

        let mut manifest = self.manifest()?;
        manifest.layers.insert(
            name.to_string(),
            LayerEntry {
                crs: crs.to_string(),
                features,
                written_at: Utc::now(),
            },
        );
        serde_json::to_writer_pretty(
            BufWriter::new(File::create(self.file_path(MANIFEST_FILE))?),
            &manifest,
        )?;

        info!("Saved layer '{name}' ({features} features) to {}", path.display());
        Ok(())
    }

    /// Reads a layer and its CRS.
    ///
    /// `stage` names the stage producing the layer, used in the error when
    /// the layer is missing.
    pub fn read_layer(
        &self,
        name: &str,
        stage: &'static str,
    ) -> Result<(FeatureCollection, String), Error> {
        let path = self.layer_path(name);
        if !path.is_file() {
            return Err(Error::MissingLayer {
                layer: name.to_string(),
                stage,
            });
        }
        debug!("Reading layer '{name}' from {}", path.display());
        let collection = read_feature_collection(&path)?;
        let crs = collection_crs(&collection).ok_or_else(|| {
            Error::InvalidData(format!("Layer '{name}' does not declare a CRS"))
        })?;
        Ok((collection, crs))
    }

    pub fn write_wards(&self, name: &str, wards: &[Ward], crs: &str) -> Result<(), Error> {
        let features = wards
            .iter()
            .map(ward_to_feature)
            .collect();
        self.write_layer(name, feature_collection(features), crs)
    }

    pub fn read_wards(&self, name: &str, stage: &'static str) -> Result<(Vec<Ward>, String), Error> {
        let (collection, crs) = self.read_layer(name, stage)?;
        let wards = wards_from_collection(collection)?;
        Ok((wards, crs))
    }

    pub fn write_facilities(
        &self,
        category: ServiceCategory,
        facilities: &[Facility],
        crs: &str,
    ) -> Result<(), Error> {
        let features = facilities
            .iter()
            .map(|facility| {
                let mut properties = facility.attributes.clone();
                properties.insert("category".to_string(), json!(category.as_str()));
                make_feature(
                    Geometry::new(GeometryValue::from(&facility.geometry)),
                    properties,
                )
            })
            .collect();
        self.write_layer(category.layer_name(), feature_collection(features), crs)
    }

    /// Reads a facility layer; `None` when the layer was never built
    pub fn read_facilities(
        &self,
        category: ServiceCategory,
    ) -> Result<Option<(Vec<Facility>, String)>, Error> {
        if !self.has_layer(category.layer_name()) {
            return Ok(None);
        }
        let (collection, crs) = self.read_layer(category.layer_name(), "build-layers")?;
        let mut facilities = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let geometry = feature_geometry(&feature)?;
            let geo::Geometry::Point(point) = geometry else {
                return Err(Error::InvalidData(format!(
                    "Layer '{}' contains a non-point feature",
                    category.layer_name()
                )));
            };
            let mut attributes = feature.properties.unwrap_or_default();
            attributes.remove("category");
            facilities.push(Facility {
                category,
                geometry: point,
                attributes,
            });
        }
        Ok(Some((facilities, crs)))
    }

    /// Writes rows as a CSV table
    pub fn write_table<T: Serialize>(&self, file: &str, rows: &[T]) -> Result<(), Error> {
        let path = self.file_path(file);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Saved table {} ({} rows)", path.display(), rows.len());
        Ok(())
    }

    pub fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), Error> {
        let path = self.file_path(file);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), value)?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

pub(crate) fn read_feature_collection(path: &Path) -> Result<FeatureCollection, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to open file '{}': {}", path.display(), e),
        )
    })?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::GeoJsonError(format!("{}: {e}", path.display())))?;
    FeatureCollection::try_from(geojson)
        .map_err(|e| Error::GeoJsonError(format!("{}: {e}", path.display())))
}

pub(crate) fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    }
}

pub(crate) fn make_feature(geometry: Geometry, properties: Attributes) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub(crate) fn feature_geometry(feature: &Feature) -> Result<geo::Geometry<f64>, Error> {
    let geometry = feature
        .geometry
        .clone()
        .ok_or_else(|| Error::InvalidData("Feature without geometry".to_string()))?;
    geo::Geometry::<f64>::try_from(geometry).map_err(|e| Error::GeoJsonError(e.to_string()))
}

fn collection_crs(collection: &FeatureCollection) -> Option<String> {
    collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .pointer("/properties/name")?
        .as_str()
        .map(ToString::to_string)
}

fn ward_to_feature(ward: &Ward) -> Feature {
    let mut properties = ward.attributes.clone();
    properties.insert("ward_id".to_string(), json!(ward.id));
    if let Some(name) = &ward.name {
        properties.insert("ward_name".to_string(), json!(name));
    }
    properties.insert("area_sqkm".to_string(), json!(ward.area_sqkm()));
    make_feature(Geometry::new(GeometryValue::from(&ward.boundary)), properties)
}

/// Converts polygon features to wards.
///
/// The identifier comes from `ward_id`, `id` or `ward_no`, falling back to
/// the 1-based feature position; the name from `ward_name` or `name`.
pub(crate) fn wards_from_collection(collection: FeatureCollection) -> Result<Vec<Ward>, Error> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(position, feature)| {
            let boundary = match feature_geometry(&feature)? {
                geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
                geo::Geometry::MultiPolygon(multi) => multi,
                _ => {
                    return Err(Error::InvalidData(format!(
                        "Ward feature {} is not a polygon",
                        position + 1
                    )));
                }
            };
            let attributes = feature.properties.unwrap_or_default();
            let id = first_text(&attributes, &["ward_id", "id", "ward_no"])
                .unwrap_or_else(|| (position + 1).to_string());
            let name = first_text(&attributes, &["ward_name", "name"]);

            Ok(Ward {
                id,
                name,
                boundary,
                attributes,
            })
        })
        .collect()
}

fn first_text(attributes: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match attributes.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// Point used when a ward polygon has no centroid (empty geometry)
pub(crate) fn ward_centroid(ward: &Ward) -> Result<Point<f64>, Error> {
    ward.centroid().ok_or_else(|| {
        Error::InvalidData(format!("Ward '{}' has an empty boundary", ward.display_name()))
    })
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn ward(id: &str, offset: f64) -> Ward {
        let square = polygon![
            (x: offset, y: 0.0),
            (x: offset + 10.0, y: 0.0),
            (x: offset + 10.0, y: 10.0),
            (x: offset, y: 10.0),
            (x: offset, y: 0.0),
        ];
        let mut ward = Ward::new(id, MultiPolygon(vec![square]));
        ward.name = Some(format!("Ward {id}"));
        ward
    }

    #[test]
    fn missing_layer_names_the_producing_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        let err = store
            .read_wards(names::WARDS_ACCESSIBILITY, "accessibility")
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::MissingLayer { layer, stage: "accessibility" } if layer == "wards_accessibility"
        ));
        assert!(err.to_string().contains("run the `accessibility` stage first"));
    }

    #[test]
    fn wards_keep_ids_attributes_and_crs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        let mut first = ward("1", 0.0);
        first.set_optional("time_hospital_min", None);
        first.set_optional("time_school_min", Some(3.25));
        let wards = vec![first, ward("2", 20.0)];

        store.write_wards(names::WARDS, &wards, "EPSG:32643").unwrap();
        let (loaded, crs) = store.read_wards(names::WARDS, "build-layers").unwrap();

        assert_eq!(crs, "EPSG:32643");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "1");
        assert_eq!(loaded[1].name.as_deref(), Some("Ward 2"));
        assert_eq!(loaded[0].attributes["time_hospital_min"], Value::Null);
        assert_eq!(loaded[0].number("time_school_min"), Some(3.25));
        assert!((loaded[0].number("area_sqkm").unwrap() - 1e-4).abs() < 1e-12);

        let manifest = store.manifest().unwrap();
        assert_eq!(manifest.layers["wards"].features, 2);
    }

    #[test]
    fn written_layers_are_plain_geojson_features() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        store
            .write_wards(names::WARDS, &[ward("7", 0.0)], "EPSG:32643")
            .unwrap();

        let text = std::fs::read_to_string(store.layer_path(names::WARDS)).unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();
        let feature = &raw["features"][0];
        assert_eq!(feature["type"], json!("Feature"));
        assert_eq!(feature["geometry"]["type"], json!("MultiPolygon"));
        assert_eq!(feature["properties"]["ward_id"], json!("7"));
        assert_eq!(raw["crs"]["properties"]["name"], json!("EPSG:32643"));
    }

    #[test]
    fn facility_layers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LayerStore::open(dir.path()).unwrap();
        assert!(store.read_facilities(ServiceCategory::School).unwrap().is_none());

        let mut facility = Facility::new(ServiceCategory::School, Point::new(5.0, 6.0));
        facility.attributes.insert("name".into(), json!("Central School"));
        store
            .write_facilities(ServiceCategory::School, &[facility], "EPSG:32643")
            .unwrap();

        let (loaded, _) = store.read_facilities(ServiceCategory::School).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].geometry, Point::new(5.0, 6.0));
        assert_eq!(loaded[0].attributes["name"], json!("Central School"));
        assert!(!loaded[0].attributes.contains_key("category"));
    }

    #[test]
    fn ward_ids_fall_back_to_position() {
        let collection: FeatureCollection = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"ward_no": 4, "name": "North"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Polygon", "coordinates": [[[2,0],[3,0],[3,1],[2,0]]]}}
            ]
        }"#
        .parse::<GeoJson>()
        .and_then(FeatureCollection::try_from)
        .unwrap();

        let wards = wards_from_collection(collection).unwrap();
        assert_eq!(wards[0].id, "4");
        assert_eq!(wards[0].name.as_deref(), Some("North"));
        assert_eq!(wards[1].id, "2");
        assert_eq!(wards[1].name, None);
    }
}
