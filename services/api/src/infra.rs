use metrics_exporter_prometheus::PrometheusHandle;
use premise_intake::config::{AppConfig, ServiceMode};
use premise_intake::error::AppError;
use premise_intake::workflows::premises::adapters::{
    ChatClient, GazetteerValidator, GeocodingValidator, InMemoryPremiseStore,
    KeywordOccupancyClassifier, LexicalSimilarityScorer, LlmOccupancyClassifier,
    LlmSimilarityScorer, OccupancyTaxonomy,
};
use premise_intake::workflows::premises::{BatchRunner, PremiseServices};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) runner: Arc<BatchRunner>,
}

/// Wires the collaborators selected by `PREMISES_SERVICE_MODE`.
pub(crate) fn build_services(config: &AppConfig) -> Result<PremiseServices, AppError> {
    let services = &config.services;
    let store = Arc::new(InMemoryPremiseStore::from_path(&services.store_path)?);
    let taxonomy = Arc::new(OccupancyTaxonomy::from_path(&services.taxonomy_path)?);

    match (services.mode, services.remote.as_ref()) {
        (ServiceMode::Remote, Some(remote)) => {
            let timeout = config.pipeline.retry.call_timeout;
            let validator = GeocodingValidator::new(
                remote.geocoding_base_url.as_str(),
                remote.geocoding_api_key.as_str(),
                timeout,
            )?;
            let scoring_client = ChatClient::new(
                remote.llm_base_url.as_str(),
                remote.llm_api_key.as_str(),
                remote.scoring_model.as_str(),
                timeout,
            )?;
            let classification_client = ChatClient::new(
                remote.llm_base_url.as_str(),
                remote.llm_api_key.as_str(),
                remote.classification_model.as_str(),
                timeout,
            )?;

            info!(
                scoring_model = %remote.scoring_model,
                classification_model = %remote.classification_model,
                "using remote premises services"
            );
            Ok(PremiseServices::new(
                Arc::new(validator),
                store,
                Arc::new(LlmSimilarityScorer::new(scoring_client)),
                Arc::new(LlmOccupancyClassifier::new(classification_client, taxonomy)),
            ))
        }
        _ => {
            let validator = GazetteerValidator::from_path(&services.gazetteer_path)?;
            info!("using offline premises services");
            Ok(PremiseServices::new(
                Arc::new(validator),
                store,
                Arc::new(LexicalSimilarityScorer),
                Arc::new(KeywordOccupancyClassifier::new(taxonomy)),
            ))
        }
    }
}
