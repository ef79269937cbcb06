use std::fmt;

use geo::Point;
use serde::{Deserialize, Serialize};

use super::Attributes;

/// Service category a facility point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Hospital,
    School,
    Transport,
}

impl ServiceCategory {
    pub const ALL: [Self; 3] = [Self::Hospital, Self::School, Self::Transport];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::School => "school",
            Self::Transport => "transport",
        }
    }

    /// Name of the store layer holding this category's points
    pub const fn layer_name(self) -> &'static str {
        match self {
            Self::Hospital => "hospitals",
            Self::School => "schools",
            Self::Transport => "transport",
        }
    }

    /// Raw CSV file name the layer builder reads
    pub const fn csv_name(self) -> &'static str {
        match self {
            Self::Hospital => "hospitals.csv",
            Self::School => "schools.csv",
            Self::Transport => "transport.csv",
        }
    }

    /// Ward attribute holding travel minutes to this category
    pub fn minutes_column(self) -> String {
        format!("time_{}_min", self.as_str())
    }

    /// Ward attribute holding the raw network distance to this category
    pub fn meters_column(self) -> String {
        format!("dist_{}_m", self.as_str())
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facility point in planar coordinates
#[derive(Debug, Clone)]
pub struct Facility {
    pub category: ServiceCategory,
    pub geometry: Point<f64>,
    pub attributes: Attributes,
}

impl Facility {
    pub fn new(category: ServiceCategory, geometry: Point<f64>) -> Self {
        Self {
            category,
            geometry,
            attributes: Attributes::new(),
        }
    }
}
