// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the BROWSERPILOT_HOME environment variable for isolation.
// When BROWSERPILOT_HOME is set, config and data live under that directory.
// When unset, config uses ~/.browserpilot/ and data uses XDG_DATA_HOME/browserpilot.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the BROWSERPILOT_HOME override, if set.
fn pilot_home() -> Option<PathBuf> {
    std::env::var_os("BROWSERPILOT_HOME").map(PathBuf::from)
}

/// Home directory (falls back to the working directory on exotic hosts)
fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $BROWSERPILOT_HOME/ or ~/.browserpilot/
pub fn config_dir() -> PathBuf {
    if let Some(home) = pilot_home() {
        return home;
    }
    dirs_home().join(".browserpilot")
}

/// Data directory: $BROWSERPILOT_HOME/data/ or ~/.local/share/browserpilot/
pub fn data_dir() -> PathBuf {
    if let Some(home) = pilot_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "browserpilot")
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default session database path
pub fn db_path() -> PathBuf {
    data_dir().join("sessions.db")
}
