pub mod client;
pub mod errors;
pub mod http;
pub mod memory;
pub mod schema;
pub mod service;
pub mod wire;

pub use client::{ExecutionRecord, MetadataClient, PipelineContexts};
pub use errors::{MetadataError, MetadataResult};
pub use http::HttpMetadataStore;
pub use memory::InMemoryMetadataStore;
pub use service::MetadataStoreService;
