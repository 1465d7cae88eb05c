mod chain_client;
mod repository;

pub use chain_client::*;
pub use repository::*;
