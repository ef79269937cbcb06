pub mod nearest_target;
pub mod regular_dijkstra;
mod state;

pub use nearest_target::{TargetSet, dijkstra_nearest_target};
pub use regular_dijkstra::dijkstra_path_weights;
