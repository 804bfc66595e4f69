use std::path::{Path, PathBuf};

/// Default data directory: `~/.local/share/homestead/`
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("homestead")
}

/// Per-user config file: `~/.config/homestead/homestead.toml`
pub fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("homestead")
        .join("homestead.toml")
}

/// The driver's global config file: `~/.homestead/Homestead.yaml`
pub fn default_global_config() -> PathBuf {
    home().join(".homestead").join("Homestead.yaml")
}

/// Marker the driver writes with the uid that created the machine.
pub fn creator_uid_path(home: &Path, resource: &str, provider: &str) -> PathBuf {
    home.join(".vagrant")
        .join("machines")
        .join(resource)
        .join(provider)
        .join("creator_uid")
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home().join(rest),
        None if path == "~" => home(),
        None => PathBuf::from(path),
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}
