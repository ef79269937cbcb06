use geo::{Area, Centroid, MultiPolygon, Point};
use serde_json::Value;

use super::Attributes;

/// Administrative ward, the unit of analysis.
///
/// Geometry is fixed once projected; stages only add attributes.
#[derive(Debug, Clone)]
pub struct Ward {
    pub id: String,
    pub name: Option<String>,
    pub boundary: MultiPolygon<f64>,
    pub attributes: Attributes,
}

impl Ward {
    pub fn new(id: impl Into<String>, boundary: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            name: None,
            boundary,
            attributes: Attributes::new(),
        }
    }

    /// Representative origin for network routing
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.boundary.centroid()
    }

    pub fn area_sqkm(&self) -> f64 {
        self.boundary.unsigned_area() / 1e6
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Stores a measure that may be missing as JSON `null`
    pub fn set_optional(&mut self, key: &str, value: Option<f64>) {
        self.set(key, value.map_or(Value::Null, Value::from));
    }

    /// Reads a numeric attribute; `null` and absent keys are `None`
    pub fn number(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn square_ward() -> Ward {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1000.0, y: 0.0),
            (x: 1000.0, y: 2000.0),
            (x: 0.0, y: 2000.0),
            (x: 0.0, y: 0.0),
        ];
        Ward::new("7", MultiPolygon(vec![square]))
    }

    #[test]
    fn derives_centroid_and_area() {
        let ward = square_ward();
        let centroid = ward.centroid().unwrap();
        assert!((centroid.x() - 500.0).abs() < 1e-9);
        assert!((centroid.y() - 1000.0).abs() < 1e-9);
        assert!((ward.area_sqkm() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn missing_measures_stay_null() {
        let mut ward = square_ward();
        ward.set_optional("time_hospital_min", None);
        ward.set_optional("time_school_min", Some(4.5));
        assert_eq!(ward.attributes["time_hospital_min"], Value::Null);
        assert_eq!(ward.number("time_hospital_min"), None);
        assert_eq!(ward.number("time_school_min"), Some(4.5));
        assert_eq!(ward.display_name(), "7");
    }
}
