use std::path::Path;

use sardonyx::{Config, Source};

pub fn run(script: &Path, config: &Config, dump: bool) -> Result<(), String> {
    let source = Source::path(script)
        .map_err(|error| format!("Could not read '{}': {}", script.display(), error))?;

    if dump {
        let bytecode = sardonyx::compile(source, config).map_err(|e| e.to_string())?;
        print!("{}", bytecode);
        return Ok(());
    }

    sardonyx::run(source, config).map_err(|e| e.to_string())?;
    Ok(())
}
