//! Query-by-image scoring engine
//!
//! Owns the PCA model derived from the album-cover catalog. The model is
//! rebuilt whenever the catalog changes and swapped in atomically;
//! queries see either the previous snapshot or the new one. A pairwise
//! scoring mode is available that needs no prepared model and matches
//! the historical per-pair arithmetic.

use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use super::matrix::Matrix;
use super::pca::{
    euclidean_distance, extract_components, mean_vector, project, subtract_vector, ComponentInit,
    PcaError,
};

/// Distance at which similarity reaches zero.
const MAX_SIMILARITY_DISTANCE: f64 = 10.0;

/// Component count for the pairwise scoring mode.
const PAIRWISE_COMPONENTS: usize = 10;

#[derive(Debug, Error)]
pub enum QbiError {
    #[error("PCA model is not ready")]
    NotReady,

    #[error(transparent)]
    Pca(#[from] PcaError),
}

/// How album covers are scored against a query image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QbiScoringMode {
    /// Score against the catalog-wide PCA model snapshot.
    Model,
    /// Score each candidate with a per-pair PCA over the two vectors.
    Pairwise,
}

/// A built model: catalog mean plus extracted components.
pub struct PcaModel {
    mean: Vec<f64>,
    components: Matrix,
    #[allow(dead_code)]
    singular_values: Vec<f64>,
}

impl PcaModel {
    /// Center a raw vector on the catalog mean and project it.
    pub fn project_centered(&self, vector: &[f64]) -> Vec<f64> {
        project(&self.components, &subtract_vector(vector, &self.mean))
    }

    pub fn component_count(&self) -> usize {
        self.components.rows()
    }
}

enum ModelState {
    Uninitialized,
    Loading,
    Ready(Arc<PcaModel>),
}

/// The query-by-image engine. Cheap to share behind an `Arc`.
pub struct QbiEngine {
    state: RwLock<ModelState>,
    init: ComponentInit,
    max_components: usize,
}

impl QbiEngine {
    pub fn new(max_components: usize, init: ComponentInit) -> Self {
        QbiEngine {
            state: RwLock::new(ModelState::Uninitialized),
            init,
            max_components,
        }
    }

    /// Rebuild the model from the full set of catalog image vectors and
    /// swap it in. An empty catalog resets the engine to uninitialized.
    pub fn rebuild(&self, vectors: Vec<Vec<f64>>) -> Result<(), QbiError> {
        if vectors.is_empty() {
            *self.state.write().unwrap() = ModelState::Uninitialized;
            debug!("QBI model reset: no catalog vectors");
            return Ok(());
        }

        *self.state.write().unwrap() = ModelState::Loading;

        let count = vectors.len();
        let data = Matrix::from_rows(vectors);
        let mean = mean_vector(&data);
        let extracted = extract_components(&data, self.max_components, self.init)?;

        let model = PcaModel {
            mean,
            components: extracted.components,
            singular_values: extracted.singular_values,
        };
        info!(
            "QBI model rebuilt: {} vectors, {} components",
            count,
            model.component_count()
        );

        *self.state.write().unwrap() = ModelState::Ready(Arc::new(model));
        Ok(())
    }

    /// Drop the current model. The next query fails with `NotReady`
    /// until `rebuild` completes.
    pub fn invalidate(&self) {
        *self.state.write().unwrap() = ModelState::Uninitialized;
    }

    /// Current model snapshot, or `NotReady` while unbuilt or loading.
    pub fn snapshot(&self) -> Result<Arc<PcaModel>, QbiError> {
        match &*self.state.read().unwrap() {
            ModelState::Ready(model) => Ok(model.clone()),
            _ => Err(QbiError::NotReady),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.read().unwrap(), ModelState::Ready(_))
    }
}

/// Map a projected-space distance to a similarity in [0, 1].
pub fn distance_to_similarity(distance: f64) -> f64 {
    (1.0 - distance / MAX_SIMILARITY_DISTANCE).max(0.0)
}

/// Similarity of two projected vectors.
pub fn projected_similarity(a: &[f64], b: &[f64]) -> f64 {
    distance_to_similarity(euclidean_distance(a, b))
}

/// Per-pair similarity without a catalog model: stack the two raw
/// vectors, center on their mean, extract components from the raw stack,
/// project both centered vectors, and map the distance. Extraction over
/// a degenerate stack scores 0.
pub fn pairwise_similarity(query: &[f64], candidate: &[f64], init: ComponentInit) -> f64 {
    let stack = Matrix::from_rows(vec![query.to_vec(), candidate.to_vec()]);
    let mean = mean_vector(&stack);

    let extracted = match extract_components(&stack, PAIRWISE_COMPONENTS, init) {
        Ok(extracted) => extracted,
        Err(PcaError::EmptyMatrix) => return 0.0,
    };

    let query_projected = project(&extracted.components, &subtract_vector(query, &mean));
    let candidate_projected = project(&extracted.components, &subtract_vector(candidate, &mean));

    projected_similarity(&query_projected, &candidate_projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vectors() -> Vec<Vec<f64>> {
        vec![
            vec![128.0, 128.0, 128.0, 128.0],
            vec![10.0, 200.0, 30.0, 90.0],
            vec![255.0, 0.0, 255.0, 0.0],
        ]
    }

    #[test]
    fn test_not_ready_before_rebuild() {
        let engine = QbiEngine::new(100, ComponentInit::Deterministic);
        assert!(!engine.is_ready());
        assert!(matches!(engine.snapshot(), Err(QbiError::NotReady)));
    }

    #[test]
    fn test_rebuild_then_ready() {
        let engine = QbiEngine::new(100, ComponentInit::Deterministic);
        engine.rebuild(sample_vectors()).unwrap();
        assert!(engine.is_ready());

        let model = engine.snapshot().unwrap();
        assert!(model.component_count() <= 3);
    }

    #[test]
    fn test_invalidate_drops_model() {
        let engine = QbiEngine::new(100, ComponentInit::Deterministic);
        engine.rebuild(sample_vectors()).unwrap();
        engine.invalidate();
        assert!(matches!(engine.snapshot(), Err(QbiError::NotReady)));
    }

    #[test]
    fn test_empty_catalog_resets() {
        let engine = QbiEngine::new(100, ComponentInit::Deterministic);
        engine.rebuild(sample_vectors()).unwrap();
        engine.rebuild(Vec::new()).unwrap();
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_self_similarity_is_one() {
        let engine = QbiEngine::new(100, ComponentInit::Deterministic);
        engine.rebuild(sample_vectors()).unwrap();
        let model = engine.snapshot().unwrap();

        let vector = vec![128.0, 128.0, 128.0, 128.0];
        let projected = model.project_centered(&vector);
        assert_eq!(projected_similarity(&projected, &projected), 1.0);
    }

    #[test]
    fn test_distance_to_similarity_monotone() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert!(distance_to_similarity(1.0) > distance_to_similarity(2.0));
        assert_eq!(distance_to_similarity(10.0), 0.0);
        // Distances past the cutoff clamp to zero
        assert_eq!(distance_to_similarity(50.0), 0.0);
    }

    #[test]
    fn test_pairwise_identical_vectors() {
        let v = vec![128.0; 16];
        let sim = pairwise_similarity(&v, &v, ComponentInit::Deterministic);
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_pairwise_is_finite_for_contrasting_vectors() {
        let a = vec![0.0; 16];
        let b = vec![255.0; 16];
        let sim = pairwise_similarity(&a, &b, ComponentInit::Deterministic);
        assert!(sim.is_finite());
        assert!((0.0..=1.0).contains(&sim));
    }
}
