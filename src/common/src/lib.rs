pub mod constants;
pub mod object_store;
pub mod placeholder;
pub mod resolver;
pub mod runtime_info;
pub mod storage_root;
pub mod types;
