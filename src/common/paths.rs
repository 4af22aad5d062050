use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_MODELS_LOCATION: &str = "/models";

const CONFIG_FILE_NAME: &str = "bioauth.toml";

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/bioauth").join(CONFIG_FILE_NAME)
}

pub fn dev_data_dir() -> PathBuf {
    PathBuf::from("./dev_data")
}

pub fn user_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "bioauth", "BioAuth")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Config files in lookup order. Dev mode checks the local dev tree first.
pub fn config_search_path(dev_mode: bool) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if dev_mode {
        candidates.push(dev_data_dir().join("config").join(CONFIG_FILE_NAME));
    }
    if let Some(user) = user_config_file() {
        candidates.push(user);
    }
    candidates.push(system_config_file());
    candidates
}
