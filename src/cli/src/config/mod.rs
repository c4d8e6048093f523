mod config_loader;

pub use config_loader::{ConfigLoader, LauncherConfig, ENV_PREFIX};
