mod config;
mod error;
mod store;

pub use config::CouchConfig;
pub use error::{CouchDaoError, CouchResult};
pub use store::CouchKvStore;
