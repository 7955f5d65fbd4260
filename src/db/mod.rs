//! Database layer
//!
//! The [`StoreGateway`] trait is the seam every engine component consumes.
//! MongoDB backs production; [`MemoryGateway`] backs tests and dry runs.

pub mod bounded;
pub mod gateway;
pub mod memory;
pub mod mongo;
pub mod mongo_gateway;
pub mod schemas;

pub use bounded::BoundedGateway;
pub use gateway::{match_key, SharedGateway, StoreGateway, StoreResult};
pub use memory::MemoryGateway;
pub use mongo::{MongoClient, MongoCollection};
pub use mongo_gateway::MongoGateway;
pub use schemas::{AccountDoc, Metadata, ProfileDoc};
