mod histogram;
mod matcher;

pub use histogram::{cosine_similarity, ToneHistograms};
pub use matcher::melody_similarity;
