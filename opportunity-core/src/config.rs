//! Analysis configuration threaded through every pipeline stage.
//!
//! All sections are defaulted, so an empty TOML document yields the
//! reference setup (19 wards, UTM 43N, k = 4, 999 permutations).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::{Error, model::ServiceCategory, projection::UtmZone, routing::TravelCost};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub projection: ProjectionConfig,
    pub wards: WardConfig,
    pub speeds: SpeedConfig,
    pub access: AccessConfig,
    pub index: IndexConfig,
    pub spatial: SpatialConfig,
    pub network: NetworkConfig,
}

impl AnalysisConfig {
    /// Checks every section for values that would make a stage meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(zone) = self.projection.utm_zone {
            UtmZone::new(zone, self.projection.northern)?;
        }
        self.speeds.validate()?;
        self.access.validate()?;
        self.index.validate()?;
        self.spatial.validate()?;
        Ok(())
    }

    /// Zone configured explicitly, if any.
    pub fn utm_zone(&self) -> Result<Option<UtmZone>, Error> {
        self.projection
            .utm_zone
            .map(|zone| UtmZone::new(zone, self.projection.northern))
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// UTM zone number; derived from the ward boundaries when absent
    pub utm_zone: Option<u8>,
    pub northern: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        // EPSG:32643
        Self {
            utm_zone: Some(43),
            northern: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WardConfig {
    /// Administrative ward total; `None` disables the count check
    pub expected_count: Option<usize>,
}

impl Default for WardConfig {
    fn default() -> Self {
        Self {
            expected_count: Some(19),
        }
    }
}

impl WardConfig {
    /// # Errors
    ///
    /// Returns [`Error::WardCount`] when an expected count is configured
    /// and `found` differs from it.
    pub fn check_count(&self, found: usize) -> Result<(), Error> {
        match self.expected_count {
            Some(expected) if expected != found => Err(Error::WardCount { expected, found }),
            _ => Ok(()),
        }
    }
}

/// Road-class speed model used by speed enrichment (all speeds in km/h)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Entries given in a file are merged over the built-in table
    #[serde(deserialize_with = "merge_class_speeds")]
    pub class_speeds: BTreeMap<String, f64>,
    pub default_speed: f64,
    /// Multiplier applied to driving speeds for signals and traffic
    pub traffic_penalty: f64,
    pub walk_speed: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        let class_speeds = [
            ("motorway", 60.0),
            ("trunk", 50.0),
            ("primary", 40.0),
            ("secondary", 35.0),
            ("tertiary", 30.0),
            ("residential", 15.0),
            ("living_street", 10.0),
            ("service", 10.0),
            ("unclassified", 20.0),
        ]
        .into_iter()
        .map(|(class, speed)| (class.to_string(), speed))
        .collect();

        Self {
            class_speeds,
            default_speed: 20.0,
            traffic_penalty: 0.7,
            walk_speed: 4.5,
        }
    }
}

fn merge_class_speeds<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut speeds = SpeedConfig::default().class_speeds;
    speeds.extend(BTreeMap::<String, f64>::deserialize(deserializer)?);
    Ok(speeds)
}

impl SpeedConfig {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        ensure_positive("speeds.default_speed", self.default_speed)?;
        ensure_positive("speeds.traffic_penalty", self.traffic_penalty)?;
        ensure_positive("speeds.walk_speed", self.walk_speed)?;
        for (class, speed) in &self.class_speeds {
            ensure_positive(&format!("speeds.class_speeds.{class}"), *speed)?;
        }
        Ok(())
    }

    /// Tabulated speed for a road class, if the class is known
    pub fn class_speed(&self, class: Option<&str>) -> Option<f64> {
        class.and_then(|class| self.class_speeds.get(class)).copied()
    }
}

/// How one service category is measured
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CategoryAccess {
    pub cost: TravelCost,
    /// Speed converting distances to minutes when `cost` is `distance`
    pub flat_speed: f64,
}

impl Default for CategoryAccess {
    fn default() -> Self {
        Self {
            cost: TravelCost::DriveTime,
            flat_speed: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub hospital: CategoryAccess,
    pub school: CategoryAccess,
    pub transport: CategoryAccess,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            hospital: CategoryAccess {
                cost: TravelCost::DriveTime,
                flat_speed: 30.0,
            },
            school: CategoryAccess {
                cost: TravelCost::WalkTime,
                flat_speed: 30.0,
            },
            transport: CategoryAccess {
                cost: TravelCost::WalkTime,
                flat_speed: 4.5,
            },
        }
    }
}

impl AccessConfig {
    pub const fn for_category(&self, category: ServiceCategory) -> CategoryAccess {
        match category {
            ServiceCategory::Hospital => self.hospital,
            ServiceCategory::School => self.school,
            ServiceCategory::Transport => self.transport,
        }
    }

    /// Same plan with every category measured by network distance
    pub fn distance_only(&self) -> Self {
        let mut plan = Self {
            hospital: self.hospital,
            school: self.school,
            transport: self.transport,
        };
        plan.hospital.cost = TravelCost::Distance;
        plan.school.cost = TravelCost::Distance;
        plan.transport.cost = TravelCost::Distance;
        plan
    }

    fn validate(&self) -> Result<(), Error> {
        for category in ServiceCategory::ALL {
            let access = self.for_category(category);
            ensure_positive(
                &format!("access.{}.flat_speed", category.as_str()),
                access.flat_speed,
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Factor applied to a column maximum to impute unreachable wards
    pub missing_penalty: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            missing_penalty: 1.1,
        }
    }
}

impl IndexConfig {
    fn validate(&self) -> Result<(), Error> {
        if !self.missing_penalty.is_finite() || self.missing_penalty <= 1.0 {
            return Err(Error::InvalidConfig(format!(
                "index.missing_penalty must be greater than 1, got {}",
                self.missing_penalty
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    pub k: usize,
    pub permutations: usize,
    pub seed: u64,
    /// Global Moran's I threshold (small samples tolerate 0.1)
    pub global_significance: f64,
    /// LISA threshold; wards at or above it are not significant
    pub local_significance: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            k: 4,
            permutations: 999,
            seed: 12345,
            global_significance: 0.1,
            local_significance: 0.05,
        }
    }
}

impl SpatialConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.k == 0 {
            return Err(Error::InvalidConfig("spatial.k must be at least 1".into()));
        }
        if self.permutations == 0 {
            return Err(Error::InvalidConfig(
                "spatial.permutations must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("spatial.global_significance", self.global_significance),
            ("spatial.local_significance", self.local_significance),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must lie in (0, 1), got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub overpass_url: String,
    /// Degrees added around the ward bounding box
    pub bbox_buffer: f64,
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            bbox_buffer: 0.01,
            timeout_secs: 180,
        }
    }
}

fn ensure_positive(name: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wards.expected_count, Some(19));
        assert_eq!(config.spatial.k, 4);
        assert_eq!(config.speeds.class_speed(Some("tertiary")), Some(30.0));
        assert_eq!(config.speeds.class_speed(Some("footbridge")), None);
        assert_eq!(config.speeds.class_speed(None), None);
    }

    #[test]
    fn partial_class_table_keeps_other_classes() {
        let config: AnalysisConfig = serde_json::from_value(serde_json::json!({
            "speeds": { "class_speeds": { "primary": 45.0, "busway": 25.0 } }
        }))
        .unwrap();
        let speeds = &config.speeds;
        assert_eq!(speeds.class_speed(Some("primary")), Some(45.0));
        assert_eq!(speeds.class_speed(Some("busway")), Some(25.0));
        assert_eq!(speeds.class_speed(Some("motorway")), Some(60.0));
        assert_eq!(speeds.class_speed(Some("residential")), Some(15.0));
        assert!((speeds.traffic_penalty - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_positive_penalty() {
        let mut config = AnalysisConfig::default();
        config.speeds.traffic_penalty = 0.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_penalty_factor_not_above_one() {
        let mut config = AnalysisConfig::default();
        config.index.missing_penalty = 1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn ward_count_check() {
        let wards = WardConfig::default();
        assert!(wards.check_count(19).is_ok());
        assert!(matches!(
            wards.check_count(12),
            Err(Error::WardCount {
                expected: 19,
                found: 12
            })
        ));
        let unchecked = WardConfig {
            expected_count: None,
        };
        assert!(unchecked.check_count(3).is_ok());
    }

    #[test]
    fn distance_plan_overrides_costs() {
        let plan = AccessConfig::default().distance_only();
        for category in ServiceCategory::ALL {
            assert_eq!(plan.for_category(category).cost, TravelCost::Distance);
        }
        assert!((plan.transport.flat_speed - 4.5).abs() < f64::EPSILON);
    }
}
