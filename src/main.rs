use std::process;

use structopt::StructOpt;

// argument parser and configuration
pub mod cli;
pub mod status;

// command implementations
pub mod repl;
pub mod run;

use crate::{cli::Sdx, status::Status};

fn main() {
    status::Logger::init();
    let args = Sdx::from_args();
    let config = args.config();

    let result = match &args.script {
        Some(script) => run::run(script, &config, args.dump),
        None => repl::repl(config),
    };

    if let Err(message) = result {
        Status::fatal().log(&message);
        process::exit(1);
    }
}
