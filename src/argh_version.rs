//! `argh::from_env` with a top-level `--version` flag.

use std::path::Path;

use argh::{EarlyExit, TopLevelCommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn command_name(arg0: &str) -> &str {
    Path::new(arg0).file_name().and_then(|s| s.to_str()).unwrap_or(arg0)
}

pub fn from_env<T: TopLevelCommand>() -> T {
    let strings: Vec<String> = std::env::args().collect();
    let (arg0, rest) = match strings.split_first() {
        Some((arg0, rest)) => (command_name(arg0), rest),
        None => (env!("CARGO_PKG_NAME"), &[][..]),
    };
    let args: Vec<&str> = rest.iter().map(String::as_str).collect();
    if args.len() == 1 && matches!(args[0], "--version" | "-V") {
        println!("{arg0} {VERSION}");
        std::process::exit(0);
    }
    T::from_args(&[arg0], &args).unwrap_or_else(|EarlyExit { output, status }| match status {
        Ok(()) => {
            println!("{output}");
            std::process::exit(0);
        }
        Err(()) => {
            eprintln!("{output}\nRun {arg0} --help for more information.");
            std::process::exit(1);
        }
    })
}
