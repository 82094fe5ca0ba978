mod ast;
mod builtins;
mod config;
mod error;
mod executor;
mod job_control;
mod jobs;
mod launcher;
mod parser;
mod redirect;
mod signals;
mod sio;
mod status;

use std::io::{self, BufRead, Write};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::builtins::BuiltinAction;
use crate::config::{Options, UsageRequest};
use crate::error::ShellError;
use crate::signals::JobsLock;

fn main() {
    // Send stderr to stdout so a driver sees all output on one pipe.
    unsafe {
        libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO);
    }

    let options = match Options::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(request) => {
            if let UsageRequest::Invalid(arg) = request {
                println!("tsh: invalid option: {arg}");
            }
            println!("{}", config::usage());
            std::process::exit(1);
        }
    };

    init_tracing(&options);

    if let Err(e) = startup() {
        println!("{e}");
        std::process::exit(1);
    }

    std::process::exit(run(&options));
}

/// `RUST_LOG` chooses the filter; `-v` forces debug output. With neither,
/// logging stays off so scripted drivers see only shell output.
fn init_tracing(options: &Options) {
    let filter = if options.verbose {
        EnvFilter::new("tsh=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .with(filter)
        .init();
}

fn startup() -> Result<(), ShellError> {
    signals::install().map_err(ShellError::signal("Signal error"))?;
    let lock = JobsLock::acquire().map_err(ShellError::signal("sigprocmask"))?;
    lock.with(|table| table.initialize_all());
    Ok(())
}

/// The read/eval loop. Returns the shell's exit status.
fn run(options: &Options) -> i32 {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut raw = Vec::new();

    loop {
        if options.emit_prompt {
            print!("{}", config::PROMPT);
            let _ = stdout.flush();
        }

        raw.clear();
        match stdin.lock().read_until(b'\n', &mut raw) {
            Ok(0) => {
                let _ = stdout.flush();
                return 0;
            }
            Ok(_) => {}
            Err(e) => {
                println!("{}", ShellError::Input(e));
                return 1;
            }
        }

        // Bytes that are not UTF-8 are replaced rather than rejected.
        let line = String::from_utf8_lossy(&raw);
        match executor::eval(&line) {
            Ok(BuiltinAction::Continue) => {}
            Ok(BuiltinAction::Exit(code)) => return code,
            Err(e) if e.is_fatal() => {
                println!("{e}");
                return 1;
            }
            Err(e) => println!("{e}"),
        }
        let _ = stdout.flush();
    }
}
