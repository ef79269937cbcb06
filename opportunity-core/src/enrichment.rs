//! Speed enrichment: drive and walk traversal times for every road edge.

use log::{debug, info};

use crate::{
    Error,
    config::SpeedConfig,
    model::{RoadEdge, RoadNetwork},
};

const KMH_PER_MPH: f64 = 1.609_344;

/// Counts of where edge speeds came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub posted_limit: usize,
    pub class_lookup: usize,
    pub default_speed: usize,
    /// `maxspeed` values present but unusable
    pub rejected_limits: usize,
}

/// Sets `drive_time` and `walk_time` (seconds) on every edge.
///
/// Times are derived from length, class and speed limit only, so applying
/// this again with the same configuration leaves every edge unchanged.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] when the speed model has a non-positive
/// speed or penalty.
pub fn enrich_network(
    network: &mut RoadNetwork,
    speeds: &SpeedConfig,
) -> Result<EnrichmentSummary, Error> {
    speeds.validate()?;

    let mut summary = EnrichmentSummary::default();
    let walk_speed = kmh_to_mps(speeds.walk_speed);

    for edge in network.graph.edge_weights_mut() {
        let speed = base_speed(edge, speeds, &mut summary);
        let drive_speed = kmh_to_mps(speed * speeds.traffic_penalty);

        edge.drive_time = Some(traversal_time(edge.length, drive_speed));
        edge.walk_time = Some(traversal_time(edge.length, walk_speed));
    }

    info!(
        "Enriched {} edges: {} posted limits, {} class speeds, {} default speeds ({} unusable limits)",
        network.edge_count(),
        summary.posted_limit,
        summary.class_lookup,
        summary.default_speed,
        summary.rejected_limits
    );

    Ok(summary)
}

fn base_speed(edge: &RoadEdge, speeds: &SpeedConfig, summary: &mut EnrichmentSummary) -> f64 {
    if let Some(raw) = edge.maxspeed.as_deref() {
        if let Some(limit) = parse_speed_limit(raw) {
            summary.posted_limit += 1;
            return limit;
        }
        debug!(
            "Ignoring speed limit {raw:?} on way {:?}, using class speed",
            edge.osm_way_id
        );
        summary.rejected_limits += 1;
    }

    match speeds.class_speed(edge.road_class()) {
        Some(speed) => {
            summary.class_lookup += 1;
            speed
        }
        None => {
            summary.default_speed += 1;
            speeds.default_speed
        }
    }
}

/// Parses an OSM `maxspeed` value into km/h.
///
/// Takes the first entry of `;` lists and the first number of the entry;
/// a trailing `mph` converts the value. Zero, negative and non-numeric
/// limits (`none`, `signals`, `IN:urban`) yield `None`.
pub fn parse_speed_limit(raw: &str) -> Option<f64> {
    let first = raw.split(';').next()?.trim();
    let mut tokens = first.split_whitespace();
    let number = tokens.next()?;

    let (number, inline_mph) = match number.strip_suffix("mph") {
        Some(stripped) => (stripped, true),
        None => (number, false),
    };
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let is_mph = inline_mph || tokens.next().is_some_and(|unit| unit.eq_ignore_ascii_case("mph"));
    Some(if is_mph { value * KMH_PER_MPH } else { value })
}

fn kmh_to_mps(speed: f64) -> f64 {
    speed / 3.6
}

fn traversal_time(length: f64, speed_mps: f64) -> f64 {
    if length <= 0.0 { 0.0 } else { length / speed_mps }
}
