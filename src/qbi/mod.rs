mod engine;
mod matrix;
mod pca;

pub use engine::{
    distance_to_similarity, pairwise_similarity, projected_similarity, PcaModel, QbiEngine,
    QbiError, QbiScoringMode,
};
pub use matrix::Matrix;
pub use pca::{
    euclidean_distance, mean_vector, project, subtract_vector, ComponentInit, PcaComponents,
    PcaError,
};
