use super::retry::RetryPolicy;

/// Tunables consumed by the row pipeline and batch runner.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Neighbors farther than this are never considered duplicates.
    pub proximity_radius_km: f64,
    /// K: upper bound on neighbors scored per record.
    pub max_neighbors: usize,
    /// Best similarity at or above this marks the record a duplicate.
    pub duplicate_threshold: f64,
    pub min_address_confidence: f64,
    pub retry: RetryPolicy,
    pub workers: usize,
    pub verify_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            proximity_radius_km: 0.1,
            max_neighbors: 10,
            duplicate_threshold: 0.8,
            min_address_confidence: 0.5,
            retry: RetryPolicy::default(),
            workers: 4,
            verify_output: true,
        }
    }
}
