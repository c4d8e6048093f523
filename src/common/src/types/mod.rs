pub mod int64;
mod metadata;

pub use metadata::*;
