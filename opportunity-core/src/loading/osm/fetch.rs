use std::{path::Path, time::Duration};

use geo::Rect;
use log::info;

use super::overpass::{OverpassResponse, build_query};
use crate::{Error, config::NetworkConfig};

/// Downloads highway data for `bbox` (lon/lat) from the Overpass API.
///
/// Returns the raw response body; nothing is written on failure.
pub fn download_overpass(bbox: &Rect<f64>, config: &NetworkConfig) -> Result<String, Error> {
    let query = build_query(bbox, config.timeout_secs);
    info!(
        "Requesting road network from {} for bbox {:?}",
        config.overpass_url, bbox
    );

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let response = client
        .post(&config.overpass_url)
        .form(&[("data", query.as_str())])
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| {
            Error::NetworkError(format!("Overpass request to {} failed: {e}", config.overpass_url))
        })?;
    let body = response.text()?;
    info!("Downloaded {} bytes of Overpass data", body.len());
    Ok(body)
}

pub fn parse_overpass(text: &str) -> Result<OverpassResponse, Error> {
    Ok(serde_json::from_str(text)?)
}

/// Reads a saved Overpass response
pub fn read_overpass_file(path: &Path) -> Result<(String, OverpassResponse), Error> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to open file '{}': {}", path.display(), e),
        )
    })?;
    let response = parse_overpass(&text)?;
    Ok((text, response))
}
