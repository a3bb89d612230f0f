pub mod builder;
pub mod cache;
pub mod chunking;
pub mod defaults;
pub mod emissions;
pub(crate) mod model_runtime;
pub mod profile;
pub mod runtime;
pub mod traits;
pub mod worker;
