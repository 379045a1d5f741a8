pub mod distance;
pub mod miner;

pub use distance::{DistanceStats, TripletDistanceReport, distance_row, squared_euclidean};
pub use miner::{ClassAwareMiner, TripletMiner, load_triplets, save_triplets};
