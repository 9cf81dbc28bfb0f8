//! Where Meridian looks for configuration files.
//!
//! Three files can contribute, lowest precedence first:
//!
//! | Layer   | Location                                  |
//! |---------|-------------------------------------------|
//! | user    | `$XDG_CONFIG_HOME/meridian/config.toml`   |
//! | project | `<project>/meridian.toml`                 |
//! | local   | `<project>/meridian.local.toml`           |
//!
//! The local file is meant for per-machine overrides (a fixed seed while
//! debugging, a quieter log filter) and is usually kept out of version
//! control.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

const PROJECT_FILE: &str = "meridian.toml";
const LOCAL_FILE: &str = "meridian.local.toml";
const USER_FILE: &str = "config.toml";

/// One configuration file layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
    Local,
}

impl Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Local => "local",
        })
    }
}

/// Resolves configuration file locations for one machine.
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            dirs: ProjectDirs::from("org", "Meridian", "meridian"),
        }
    }

    /// `~/.config/meridian/` on Linux; platform equivalents elsewhere.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("no home directory to hold user config".into()))
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join(USER_FILE))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_FILE)
    }

    /// Every file layer, lowest precedence first, whether or not it exists.
    ///
    /// The user layer is left out when no home directory can be found, or
    /// when `include_user` is false.
    pub fn layers(&self, project_dir: impl AsRef<Path>, include_user: bool) -> Vec<(Layer, PathBuf)> {
        let project_dir = project_dir.as_ref();
        let user = include_user
            .then(|| self.user_config_file().ok())
            .flatten()
            .map(|path| (Layer::User, path));

        user.into_iter()
            .chain([
                (Layer::Project, Self::project_config_file(project_dir)),
                (Layer::Local, Self::local_config_file(project_dir)),
            ])
            .collect()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_user_file_lives_under_meridian_dir() {
        // No home directory on some CI hosts; only check when resolvable.
        if let Ok(file) = Paths::new().user_config_file() {
            assert!(file.to_string_lossy().contains("meridian"));
            assert!(file.ends_with(USER_FILE));
        }
    }

    #[test]
    fn test_layers_in_precedence_order() {
        let temp = tempdir().unwrap();
        let layers = Paths::new().layers(temp.path(), false);
        assert_eq!(
            layers,
            vec![
                (Layer::Project, temp.path().join("meridian.toml")),
                (Layer::Local, temp.path().join("meridian.local.toml")),
            ]
        );
    }

    #[test]
    fn test_user_layer_comes_first_when_included() {
        let temp = tempdir().unwrap();
        let paths = Paths::new();
        let layers = paths.layers(temp.path(), true);
        match paths.user_config_file() {
            Ok(user) => assert_eq!(layers.first(), Some(&(Layer::User, user))),
            Err(_) => assert_eq!(layers.len(), 2),
        }
        assert_eq!(layers.last().map(|(layer, _)| *layer), Some(Layer::Local));
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(Layer::User.to_string(), "user");
        assert_eq!(Layer::Local.to_string(), "local");
    }
}
