use super::Prediction;

/// Ordered chain of completed predictions for one session.
///
/// Insertion order is edit order. Entries are never reordered or deduplicated.
#[derive(Debug, Clone, Default)]
pub struct PredictionStore {
    predictions: Vec<Prediction>,
}

impl PredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, prediction: Prediction) {
        self.predictions.push(prediction);
    }

    /// Chain order view. The iterator is `Clone`, so it can be restarted.
    pub fn all(&self) -> std::slice::Iter<'_, Prediction> {
        self.predictions.iter()
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    pub fn last(&self) -> Option<&Prediction> {
        self.predictions.last()
    }

    pub fn latest_output(&self) -> Option<&str> {
        self.predictions
            .iter()
            .rev()
            .find_map(|prediction| prediction.output.as_deref())
    }

    pub fn output_handles(&self) -> Vec<String> {
        self.predictions
            .iter()
            .filter_map(|prediction| prediction.output.clone())
            .collect()
    }

    /// Callers release [`Self::output_handles`] before clearing.
    pub fn clear(&mut self) {
        self.predictions.clear();
    }

    pub fn to_vec(&self) -> Vec<Prediction> {
        self.predictions.clone()
    }
}
