pub mod config;
pub mod s3;

pub use config::AwsConfig;
pub use s3::{S3ObjectStore, S3Settings};
