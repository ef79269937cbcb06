use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No network nodes found for snapping")]
    NoPointsFound,
    #[error("Invalid node index")]
    InvalidNodeIndex,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Download failed: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Expected {expected} wards but found {found}; check the boundary file for duplicates or missing areas")]
    WardCount { expected: usize, found: usize },
    #[error("Layer '{layer}' is missing from the store; run the `{stage}` stage first")]
    MissingLayer { layer: String, stage: &'static str },
    #[error("Road network has no travel times; run the `enrich` stage first")]
    NotEnriched,
    #[error("Statistics error: {0}")]
    StatisticsError(String),
}
