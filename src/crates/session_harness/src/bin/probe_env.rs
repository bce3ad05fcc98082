//! Prints the working directory and the requested environment variables so
//! integration tests can check what a spawned subprocess actually sees.
//!
//! Usage: `probe_env [--exit CODE] [VAR...]`

use std::env;
use std::process;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut exit_code = 0;
    let mut vars = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--exit" {
            let code = args.next().ok_or("--exit needs a value")?;
            exit_code = code.parse()?;
        } else {
            vars.push(arg);
        }
    }

    println!("cwd={}", env::current_dir()?.display());
    for var in vars {
        match env::var(&var) {
            Ok(value) => println!("{var}={value}"),
            Err(_) => println!("{var} unset"),
        }
    }
    eprintln!("probe finished with {exit_code}");

    if exit_code != 0 {
        process::exit(exit_code);
    }
    Ok(())
}
