pub mod catalog;
pub mod embedding_model;
pub mod gateway;
pub mod model_handle;
pub mod ranking;
pub mod scorer;
pub mod validator;

pub use catalog::{Catalog, CatalogError, InMemoryCatalog};
pub use embedding_model::EmbeddingModel;
pub use gateway::GatewayService;
pub use model_handle::{LoadedModel, ModelHandle};
pub use ranking::{Ranking, RankingEngine, RankingMode};
pub use scorer::{CandidateStream, ScoredCandidates, Scorer, ScorerError};
pub use validator::RequestValidator;
