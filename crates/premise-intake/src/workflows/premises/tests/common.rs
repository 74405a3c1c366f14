use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::workflows::premises::domain::{
    AddressQuery, Coordinates, Neighbor, OccupancyResult, PremiseAttributes, PremiseId, RawRecord,
    RowId, ValidatedAddress,
};
use crate::workflows::premises::services::{
    AddressValidator, ClassificationFailure, OccupancyClassifier, PremiseServices,
    ProximityFailure, ProximityMatcher, ScoringFailure, SimilarityScorer, ValidationFailure,
};
use crate::workflows::premises::{BatchRunner, DrainHandle, PipelineConfig, RetryPolicy, RowPipeline};

pub(super) fn record(row: u64, name: &str, address_line: &str) -> RawRecord {
    RawRecord {
        row_id: RowId(row),
        business_name: name.to_string(),
        business_type: "Retail".to_string(),
        address_line: address_line.to_string(),
        city: "Auburn".to_string(),
        state_code: "CA".to_string(),
        postal_code: "95603".to_string(),
    }
}

/// Validated address whose latitude doubles as the proximity lookup key.
pub(super) fn validated(address_line: &str, latitude: f64) -> ValidatedAddress {
    ValidatedAddress {
        address_line: address_line.to_string(),
        city: "Auburn".to_string(),
        state_code: "CA".to_string(),
        postal_code: "95603".to_string(),
        latitude,
        longitude: -121.08,
        confidence: 0.95,
        place_name: None,
        place_type: None,
    }
}

pub(super) fn neighbor(id: i64, name: &str, distance_km: f64) -> Neighbor {
    Neighbor {
        premise_id: PremiseId(id),
        latitude: 38.93,
        longitude: -121.08,
        name: name.to_string(),
        address: "1860 Millertown Road, Auburn, CA".to_string(),
        business_type: "Retail".to_string(),
        distance_km,
    }
}

pub(super) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        call_timeout: Duration::from_secs(1),
        max_retries: 2,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

pub(super) fn config() -> PipelineConfig {
    PipelineConfig {
        duplicate_threshold: 0.85,
        retry: fast_retry(),
        workers: 3,
        ..PipelineConfig::default()
    }
}

/// Replies per address line; the last scripted reply repeats.
#[derive(Default)]
pub(super) struct ScriptedValidator {
    replies: Mutex<HashMap<String, VecDeque<Result<ValidatedAddress, ValidationFailure>>>>,
    panics_on: Mutex<HashSet<String>>,
    drain_on_call: Mutex<Option<DrainHandle>>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub(super) fn reply(&self, address_line: &str, reply: Result<ValidatedAddress, ValidationFailure>) {
        self.replies
            .lock()
            .expect("validator mutex poisoned")
            .entry(address_line.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(super) fn resolve(&self, address_line: &str, latitude: f64) {
        self.reply(address_line, Ok(validated(address_line, latitude)));
    }

    pub(super) fn panic_on(&self, address_line: &str) {
        self.panics_on
            .lock()
            .expect("validator mutex poisoned")
            .insert(address_line.to_string());
    }

    pub(super) fn drain_on_call(&self, drain: DrainHandle) {
        *self.drain_on_call.lock().expect("validator mutex poisoned") = Some(drain);
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressValidator for ScriptedValidator {
    async fn validate(&self, query: &AddressQuery) -> Result<ValidatedAddress, ValidationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(drain) = self.drain_on_call.lock().expect("validator mutex poisoned").as_ref() {
            drain.request();
        }
        if self
            .panics_on
            .lock()
            .expect("validator mutex poisoned")
            .contains(&query.address_line)
        {
            panic!("validator blew up on {}", query.address_line);
        }

        let mut replies = self.replies.lock().expect("validator mutex poisoned");
        match replies.get_mut(&query.address_line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Err(ValidationFailure::NoMatch)),
            Some(queue) => queue.front().cloned().unwrap_or(Err(ValidationFailure::NoMatch)),
            None => Err(ValidationFailure::NoMatch),
        }
    }
}

/// Neighbors keyed by the origin latitude; unknown origins have none.
#[derive(Default)]
pub(super) struct ScriptedProximity {
    neighbors: Mutex<HashMap<u64, Vec<Neighbor>>>,
    failure: Mutex<Option<ProximityFailure>>,
    health: Mutex<Option<ProximityFailure>>,
    calls: AtomicUsize,
    health_checks: AtomicUsize,
}

impl ScriptedProximity {
    pub(super) fn neighbors_at(&self, latitude: f64, neighbors: Vec<Neighbor>) {
        self.neighbors
            .lock()
            .expect("proximity mutex poisoned")
            .insert(latitude.to_bits(), neighbors);
    }

    pub(super) fn fail_lookups(&self, failure: ProximityFailure) {
        *self.failure.lock().expect("proximity mutex poisoned") = Some(failure);
    }

    pub(super) fn fail_health_check(&self, failure: ProximityFailure) {
        *self.health.lock().expect("proximity mutex poisoned") = Some(failure);
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProximityMatcher for ScriptedProximity {
    async fn nearest(
        &self,
        origin: Coordinates,
        _radius_km: f64,
        _max_k: usize,
    ) -> Result<Vec<Neighbor>, ProximityFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure.lock().expect("proximity mutex poisoned").clone() {
            return Err(failure);
        }
        Ok(self
            .neighbors
            .lock()
            .expect("proximity mutex poisoned")
            .get(&origin.latitude.to_bits())
            .cloned()
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), ProximityFailure> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        match self.health.lock().expect("proximity mutex poisoned").clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// Scores keyed by neighbor name; unknown neighbors score 0.1.
#[derive(Default)]
pub(super) struct ScriptedScorer {
    scores: Mutex<HashMap<String, Result<f64, ScoringFailure>>>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub(super) fn set_score(&self, neighbor_name: &str, reply: Result<f64, ScoringFailure>) {
        self.scores
            .lock()
            .expect("scorer mutex poisoned")
            .insert(neighbor_name.to_string(), reply);
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SimilarityScorer for ScriptedScorer {
    async fn score(
        &self,
        _candidate: &PremiseAttributes,
        neighbor: &PremiseAttributes,
    ) -> Result<f64, ScoringFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scores
            .lock()
            .expect("scorer mutex poisoned")
            .get(&neighbor.name)
            .cloned()
            .unwrap_or(Ok(0.1))
    }
}

/// Classifies everything as Mercantile unless a failure is queued.
#[derive(Default)]
pub(super) struct ScriptedClassifier {
    failures: Mutex<VecDeque<ClassificationFailure>>,
    confidence: Mutex<Option<f64>>,
    business_types: Mutex<Vec<String>>,
    state_codes: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub(super) fn fail_next(&self, failure: ClassificationFailure) {
        self.failures
            .lock()
            .expect("classifier mutex poisoned")
            .push_back(failure);
    }

    pub(super) fn confidence(&self, confidence: f64) {
        *self.confidence.lock().expect("classifier mutex poisoned") = Some(confidence);
    }

    pub(super) fn business_types(&self) -> Vec<String> {
        self.business_types
            .lock()
            .expect("classifier mutex poisoned")
            .clone()
    }

    pub(super) fn state_codes(&self) -> Vec<String> {
        self.state_codes
            .lock()
            .expect("classifier mutex poisoned")
            .clone()
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OccupancyClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        business_type: &str,
        state_code: &str,
    ) -> Result<OccupancyResult, ClassificationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.state_codes
            .lock()
            .expect("classifier mutex poisoned")
            .push(state_code.to_string());
        self.business_types
            .lock()
            .expect("classifier mutex poisoned")
            .push(business_type.to_string());
        if let Some(failure) = self
            .failures
            .lock()
            .expect("classifier mutex poisoned")
            .pop_front()
        {
            return Err(failure);
        }
        let confidence = self
            .confidence
            .lock()
            .expect("classifier mutex poisoned")
            .unwrap_or(0.9);
        Ok(OccupancyResult {
            category: "Mercantile".to_string(),
            confidence,
        })
    }
}

#[derive(Default, Clone)]
pub(super) struct Stubs {
    pub(super) validator: Arc<ScriptedValidator>,
    pub(super) proximity: Arc<ScriptedProximity>,
    pub(super) scorer: Arc<ScriptedScorer>,
    pub(super) classifier: Arc<ScriptedClassifier>,
}

impl Stubs {
    pub(super) fn services(&self) -> PremiseServices {
        PremiseServices::new(
            self.validator.clone(),
            self.proximity.clone(),
            self.scorer.clone(),
            self.classifier.clone(),
        )
    }

    pub(super) fn pipeline(&self, config: PipelineConfig) -> RowPipeline {
        RowPipeline::new(self.services(), config)
    }

    pub(super) fn runner(&self, config: PipelineConfig) -> BatchRunner {
        BatchRunner::new(self.pipeline(config))
    }
}
