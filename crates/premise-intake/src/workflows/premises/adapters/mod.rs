//! Concrete collaborators. Offline adapters read reference CSVs; remote adapters
//! call a geocoding endpoint and chat-completions endpoints.

use std::path::PathBuf;

pub mod gazetteer;
pub mod geocoding;
pub mod lexical;
pub mod llm;
pub mod store;
pub mod taxonomy;
pub(crate) mod text;

pub use gazetteer::GazetteerValidator;
pub use geocoding::{parse_geocode_response, GeocodeResponse, GeocodingValidator};
pub use lexical::LexicalSimilarityScorer;
pub use llm::{ChatClient, LlmError, LlmOccupancyClassifier, LlmSimilarityScorer};
pub use store::InMemoryPremiseStore;
pub use taxonomy::{KeywordOccupancyClassifier, OccupancyCategory, OccupancyTaxonomy};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
