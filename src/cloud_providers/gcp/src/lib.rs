mod gcs;

pub use gcs::{GcsObjectStore, GcsSettings, DEFAULT_GCS_ENDPOINT};
