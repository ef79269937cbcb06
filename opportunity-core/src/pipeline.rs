//! Pipeline stages. Each stage reads its inputs from the layer store,
//! runs to completion and only then writes its outputs.

use std::path::Path;

use geo::Point;
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;

use crate::{
    Error,
    analysis::{
        CompositeIndex, GlobalMoran, Indicator, SpatialWeights, composite_index, global_moran,
        local_moran,
    },
    config::AnalysisConfig,
    enrichment::{EnrichmentSummary, enrich_network},
    loading::{
        build_layers as project_layers, create_road_network, download_overpass, load_network,
        parse_overpass, read_overpass_file, roads_layer, save_network, wards_lon_lat_bbox,
    },
    model::{RoadNetwork, ServiceCategory, Ward},
    projection::UtmZone,
    routing::{AccessMeasure, TravelCost, measure_category},
    store::{LayerStore, names, ward_centroid},
};

pub mod stage {
    pub const BUILD_LAYERS: &str = "build-layers";
    pub const FETCH_NETWORK: &str = "fetch-network";
    pub const ENRICH: &str = "enrich";
    pub const ACCESSIBILITY: &str = "accessibility";
    pub const INDEX: &str = "index";
}

/// Projects the raw inputs and writes the ward and facility layers
pub fn build_layers(
    store: &LayerStore,
    config: &AnalysisConfig,
    raw_dir: &Path,
) -> Result<usize, Error> {
    let layers = project_layers(raw_dir, config)?;
    let crs = layers.zone.crs_name();

    store.write_wards(names::WARDS, &layers.wards, &crs)?;
    for (category, facilities) in &layers.facilities {
        store.write_facilities(*category, facilities, &crs)?;
    }
    Ok(layers.wards.len())
}

/// Reports the stored ward count and checks it against the configuration
pub fn check_wards(store: &LayerStore, config: &AnalysisConfig) -> Result<usize, Error> {
    let (wards, crs) = store.read_wards(names::WARDS, stage::BUILD_LAYERS)?;
    info!("Ward layer holds {} wards ({crs})", wards.len());
    config.wards.check_count(wards.len())?;
    Ok(wards.len())
}

/// Loads OSM road data and stores the topological network.
///
/// Data comes from `input` when given, else from the cached Overpass
/// response, else from a fresh download (also when `refresh` is set).
pub fn fetch_network(
    store: &LayerStore,
    config: &AnalysisConfig,
    input: Option<&Path>,
    refresh: bool,
) -> Result<RoadNetwork, Error> {
    let (wards, crs) = store.read_wards(names::WARDS, stage::BUILD_LAYERS)?;
    let zone = UtmZone::from_crs_name(&crs)?;
    let cache = store.file_path(names::OVERPASS_CACHE);

    // Fresh responses are cached only once they yield a usable network
    let (fresh, response) = if let Some(input) = input {
        info!("Reading Overpass data from {}", input.display());
        let (text, response) = read_overpass_file(input)?;
        (Some(text), response)
    } else if cache.is_file() && !refresh {
        info!("Using cached Overpass data at {}", cache.display());
        (None, read_overpass_file(&cache)?.1)
    } else {
        let bbox = wards_lon_lat_bbox(&wards, &zone, config.network.bbox_buffer)
            .ok_or_else(|| Error::InvalidData("Ward boundaries are empty".to_string()))?;
        let text = download_overpass(&bbox, &config.network)?;
        let response = parse_overpass(&text)?;
        (Some(text), response)
    };

    let network = create_road_network(&response, &zone)?;
    if let Some(text) = fresh {
        std::fs::write(&cache, text)?;
    }
    save_network(&network, &store.file_path(names::NETWORK_FILE))?;
    store.write_layer(names::ROADS, roads_layer(&network), network.crs())?;
    Ok(network)
}

fn read_network(store: &LayerStore) -> Result<RoadNetwork, Error> {
    let path = store.file_path(names::NETWORK_FILE);
    if !path.is_file() {
        return Err(Error::MissingLayer {
            layer: names::NETWORK_FILE.to_string(),
            stage: stage::FETCH_NETWORK,
        });
    }
    load_network(&path)
}

/// Adds drive and walk times to the stored network
pub fn enrich(store: &LayerStore, config: &AnalysisConfig) -> Result<EnrichmentSummary, Error> {
    let mut network = read_network(store)?;
    let summary = enrich_network(&mut network, &config.speeds)?;
    save_network(&network, &store.file_path(names::NETWORK_FILE))?;
    store.write_layer(names::ROADS, roads_layer(&network), network.crs())?;
    Ok(summary)
}

/// One row of `ward_accessibility_scores.csv`
#[derive(Debug, Clone, Serialize)]
pub struct AccessibilityRow {
    pub ward_id: String,
    pub ward_name: Option<String>,
    pub time_hospital_min: Option<f64>,
    pub time_school_min: Option<f64>,
    pub time_transport_min: Option<f64>,
    pub dist_hospital_m: Option<f64>,
    pub dist_school_m: Option<f64>,
    pub dist_transport_m: Option<f64>,
}

/// Travel minutes from every ward centroid to the nearest facility of each
/// category, written to the `wards_accessibility` layer and a table
pub fn accessibility(
    store: &LayerStore,
    config: &AnalysisConfig,
) -> Result<Vec<AccessibilityRow>, Error> {
    let network = read_network(store)?;
    let (mut wards, crs) = store.read_wards(names::WARDS, stage::BUILD_LAYERS)?;
    if crs != network.crs() {
        return Err(Error::InvalidData(format!(
            "Ward layer is in {crs} but the road network is in {}",
            network.crs()
        )));
    }
    let centroids = wards
        .iter()
        .map(ward_centroid)
        .collect::<Result<Vec<Point<f64>>, _>>()?;

    let mut measures: Vec<(ServiceCategory, Vec<AccessMeasure>)> = Vec::new();
    for category in ServiceCategory::ALL {
        let access = config.access.for_category(category);
        let category_measures = match store.read_facilities(category)? {
            Some((facilities, _)) => {
                let points: Vec<Point<f64>> = facilities.iter().map(|f| f.geometry).collect();
                info!(
                    "Measuring {category} access ({:?}) to {} facilities",
                    access.cost,
                    points.len()
                );
                measure_category(&network, &centroids, &points, access)?
            }
            None => {
                warn!("No {category} layer in the store; {category} access is unknown for every ward");
                vec![AccessMeasure::unavailable(access.cost); wards.len()]
            }
        };
        measures.push((category, category_measures));
    }

    for (category, category_measures) in &measures {
        for (ward, measure) in wards.iter_mut().zip(category_measures) {
            ward.set_optional(&category.minutes_column(), measure.minutes);
            if measure.cost == TravelCost::Distance {
                ward.set_optional(&category.meters_column(), measure.raw);
            }
        }
    }

    let rows: Vec<AccessibilityRow> = wards.iter().map(accessibility_row).collect();
    store.write_wards(names::WARDS_ACCESSIBILITY, &wards, &crs)?;
    store.write_table(names::ACCESSIBILITY_TABLE, &rows)?;
    Ok(rows)
}

fn accessibility_row(ward: &Ward) -> AccessibilityRow {
    let minutes = |category: ServiceCategory| ward.number(&category.minutes_column());
    let meters = |category: ServiceCategory| ward.number(&category.meters_column());
    AccessibilityRow {
        ward_id: ward.id.clone(),
        ward_name: ward.name.clone(),
        time_hospital_min: minutes(ServiceCategory::Hospital),
        time_school_min: minutes(ServiceCategory::School),
        time_transport_min: minutes(ServiceCategory::Transport),
        dist_hospital_m: meters(ServiceCategory::Hospital),
        dist_school_m: meters(ServiceCategory::School),
        dist_transport_m: meters(ServiceCategory::Transport),
    }
}

/// One row of `ward_pca_scores.csv`
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow {
    pub ward_id: String,
    pub ward_name: Option<String>,
    /// Observed minutes; unreachable stays empty even though it was imputed
    pub time_hospital_min: Option<f64>,
    pub time_school_min: Option<f64>,
    pub time_transport_min: Option<f64>,
    pub pca_raw_value: f64,
    pub uoi_score: f64,
    pub rank: usize,
}

/// Builds the composite opportunity index from the accessibility layer
pub fn index(store: &LayerStore, config: &AnalysisConfig) -> Result<CompositeIndex, Error> {
    info!("Index input layer: '{}'", names::WARDS_ACCESSIBILITY);
    let (mut wards, crs) = store.read_wards(names::WARDS_ACCESSIBILITY, stage::ACCESSIBILITY)?;
    config.wards.check_count(wards.len())?;

    let indicators: Vec<Indicator> = ServiceCategory::ALL
        .iter()
        .map(|category| Indicator {
            name: category.minutes_column(),
            values: wards
                .iter()
                .map(|ward| ward.number(&category.minutes_column()))
                .collect(),
        })
        .collect();
    let result = composite_index(&indicators, &config.index)?;

    let mut rows = Vec::with_capacity(wards.len());
    for (i, ward) in wards.iter_mut().enumerate() {
        ward.set("pca_raw_value", result.raw[i]);
        ward.set("uoi_score", result.scores[i]);
        ward.set("rank", result.ranks[i]);
        rows.push(ScoreRow {
            ward_id: ward.id.clone(),
            ward_name: ward.name.clone(),
            time_hospital_min: indicators[0].values[i],
            time_school_min: indicators[1].values[i],
            time_transport_min: indicators[2].values[i],
            pca_raw_value: result.raw[i],
            uoi_score: result.scores[i],
            rank: result.ranks[i],
        });
    }

    if let Some(best) = rows.iter().find(|row| row.rank == 1) {
        info!(
            "Highest opportunity: ward {} ({:.1})",
            best.ward_id, best.uoi_score
        );
    }

    store.write_wards(names::WARDS_FINAL_INDEX, &wards, &crs)?;
    store.write_table(names::INDEX_TABLE, &rows)?;
    Ok(result)
}

/// One row of `ward_lisa_clusters.csv`
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRow {
    pub ward_id: String,
    pub ward_name: Option<String>,
    pub uoi_score: f64,
    pub lisa_cluster: u8,
    pub lisa_i: f64,
    pub lisa_pval: f64,
    pub lisa_label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpatialSummary {
    pub k: usize,
    pub global: GlobalMoran,
    pub clustering_detected: bool,
    pub significant_wards: usize,
}

/// Global and local spatial autocorrelation of the opportunity score
pub fn spatial(store: &LayerStore, config: &AnalysisConfig) -> Result<SpatialSummary, Error> {
    let spatial = &config.spatial;
    let (mut wards, crs) = store.read_wards(names::WARDS_FINAL_INDEX, stage::INDEX)?;
    let scores = wards
        .iter()
        .map(|ward| {
            ward.number("uoi_score").ok_or_else(|| {
                Error::InvalidData(format!("Ward '{}' has no uoi_score", ward.display_name()))
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let centroids = wards
        .iter()
        .map(ward_centroid)
        .collect::<Result<Vec<_>, _>>()?;

    let weights = SpatialWeights::knn(&centroids, spatial.k)?.row_standardized();
    let mut rng = StdRng::seed_from_u64(spatial.seed);
    let global = global_moran(&scores, &weights, spatial.permutations, &mut rng)?;
    let clustering_detected = global.p_sim < spatial.global_significance;
    info!(
        "Global Moran's I = {:.3} (p = {:.4}); {}",
        global.i,
        global.p_sim,
        if clustering_detected {
            "clustering detected"
        } else {
            "not significant"
        }
    );

    let local = local_moran(&scores, &weights, spatial.permutations, &mut rng)?;
    let mut rows = Vec::with_capacity(wards.len());
    for ((ward, result), score) in wards.iter_mut().zip(&local).zip(&scores) {
        let label = result.label(spatial.local_significance);
        ward.set("lisa_cluster", result.quadrant.code());
        ward.set("lisa_i", result.i);
        ward.set("lisa_pval", result.p_sim);
        ward.set("lisa_label", label);
        rows.push(ClusterRow {
            ward_id: ward.id.clone(),
            ward_name: ward.name.clone(),
            uoi_score: *score,
            lisa_cluster: result.quadrant.code(),
            lisa_i: result.i,
            lisa_pval: result.p_sim,
            lisa_label: label,
        });
    }
    let significant_wards = local
        .iter()
        .filter(|result| result.p_sim < spatial.local_significance)
        .count();
    info!("Found {significant_wards} significant hotspot/coldspot wards");

    let summary = SpatialSummary {
        k: spatial.k,
        global,
        clustering_detected,
        significant_wards,
    };
    store.write_wards(names::WARDS_LISA, &wards, &crs)?;
    store.write_table(names::LISA_TABLE, &rows)?;
    store.write_json(names::SPATIAL_SUMMARY, &summary)?;
    Ok(summary)
}

/// Runs every stage in order
pub fn run_all(
    store: &LayerStore,
    config: &AnalysisConfig,
    raw_dir: &Path,
    network_input: Option<&Path>,
) -> Result<SpatialSummary, Error> {
    config.validate()?;
    build_layers(store, config, raw_dir)?;
    check_wards(store, config)?;
    fetch_network(store, config, network_input, false)?;
    enrich(store, config)?;
    accessibility(store, config)?;
    index(store, config)?;
    spatial(store, config)
}
