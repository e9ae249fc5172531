use std::path::PathBuf;

use sardonyx::Config;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "Sardonyx", bin_name = "sdx", about)]
pub struct Sdx {
    /// Runs this script; starts a repl when left out
    #[structopt(parse(from_os_str))]
    pub script: Option<PathBuf>,
    /// Extra module directories, colon separated
    #[structopt(long)]
    pub path: Option<String>,
    /// Prints the compiled bytecode instead of running it
    #[structopt(long)]
    pub dump: bool,
    /// How deep nested calls may go
    #[structopt(long)]
    pub recursion_limit: Option<usize>,
}

impl Sdx {
    /// The script's directory, then `SDX_PATH`, then `--path`.
    pub fn config(&self) -> Config {
        let mut config = Config::from_env(self.script.as_deref());
        if let Some(path) = &self.path {
            config.extend_path(path);
        }
        match self.recursion_limit {
            Some(limit) => config.with_recursion_limit(limit),
            None => config,
        }
    }
}
