//! Where RepoMentor stores its own data (config, sessions).
//!
//! Each session keeps its repository snapshot and index under `sessions/<id>/`.

use std::path::PathBuf;

/// Returns the directory where RepoMentor stores config and session data.
/// On Linux: `~/.local/share/repomentor/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "RepoMentor", "RepoMentor")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Root under which every session directory lives.
pub fn sessions_root() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("sessions"))
}
