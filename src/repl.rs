use std::path::Path;

use rustyline::{error::ReadlineError, DefaultEditor};
use sardonyx::{Config, Source, VM};

use crate::status::Status;

/// Compiles and runs one line against the session's VM,
/// echoing the value it leaves on the stack.
fn eval(vm: &mut VM, line: &str, config: &Config) -> Result<(), String> {
    let source = Source::new(line, Path::new("./repl"));
    let bytecode = sardonyx::compile(source, config).map_err(|e| e.to_string())?;

    let before = vm.stack().count();
    vm.load(bytecode);
    vm.run().map_err(|e| e.to_string())?;

    if vm.stack().count() > before {
        if let Some(shown) = vm.show_top().map_err(|e| e.to_string())? {
            println!("{}", shown);
        }
    }
    Ok(())
}

pub fn repl(config: Config) -> Result<(), String> {
    let mut editor = DefaultEditor::new()
        .map_err(|error| format!("Could not start the line editor: {}", error))?;
    println!("Sardonyx v{}", env!("CARGO_PKG_VERSION"));

    let mut vm = VM::new(config.clone());
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.to_string()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        // errors end the line, not the session
        if let Err(message) = eval(&mut vm, &line, &config) {
            Status::warn().log(&message);
        }
    }

    Ok(())
}
