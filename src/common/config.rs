use std::{
    env,
    path::{Path, PathBuf},
};

/// Environment variable holding extra module directories, colon separated.
pub const PATH_VAR: &str = "SDX_PATH";
/// Extension every module file carries.
pub const EXTENSION: &str = "sdx";

/// Settings shared by the compiler and the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directories searched, in order, by `require`.
    pub search_path: Vec<PathBuf>,
    /// How deep nested calls may go before giving up.
    pub recursion_limit: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            search_path: vec![PathBuf::from(".")],
            recursion_limit: 200,
        }
    }
}

impl Config {
    /// Builds a configuration for running `script`:
    /// the script's own directory comes first,
    /// followed by every entry of `SDX_PATH`.
    /// Without a script (in the repl), the working directory is used.
    pub fn from_env(script: Option<&Path>) -> Config {
        let mut config = Config {
            search_path: vec![],
            ..Config::default()
        };

        let dir = script
            .and_then(|s| s.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.search_path.push(dir);

        if let Ok(paths) = env::var(PATH_VAR) {
            config.extend_path(&paths);
        }

        config
    }

    /// Appends colon-separated directories to the search path.
    pub fn extend_path(&mut self, paths: &str) {
        self.search_path.extend(
            paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        );
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Config {
        self.recursion_limit = limit;
        self
    }

    /// Finds `<name>.sdx` in the first search directory that holds it.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(format!("{}.{}", name, EXTENSION)))
            .find(|candidate| candidate.is_file())
    }
}
