//! Where FinChat stores its own data (config, persisted indexes).

use std::path::PathBuf;

const INDEX_DIR: &str = "indexes";

/// Returns the directory where FinChat stores config, indexes and other app data.
/// On macOS: `~/Library/Application Support/FinChat/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "FinChat", "FinChat")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Directory holding one persisted vector store per scope.
pub fn index_dir() -> Option<PathBuf> {
    let dir = app_data_dir()?.join(INDEX_DIR);
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
