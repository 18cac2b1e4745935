pub mod cache_key;
pub mod coordinator;
pub mod freshness;
pub mod metrics;
pub mod predictor;
pub mod trainer;
pub mod worker_pool;

pub use cache_key::*;
pub use coordinator::*;
pub use freshness::*;
pub use metrics::*;
pub use predictor::*;
pub use trainer::*;
pub use worker_pool::*;
