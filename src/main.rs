//! sbox - run programs inside a bubblewrap sandbox described by JSON profiles.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use miette::Result;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, fmt};

use sbox::profile::{ProfileDir, apply_profile, select_command};
use sbox::sandbox::{BubbleWrapper, DEFAULT_BWRAP, render_command_line};
use sbox::system::HostEnvironment;

/// Run a program in a bubblewrap sandbox configured by JSON profiles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing system.json and per-application profiles
    #[arg(long, env = "SBOX_PROFILE_DIR", default_value = "profiles")]
    profile_dir: PathBuf,

    /// bwrap binary to execute
    #[arg(long, env = "SBOX_BWRAP", default_value = DEFAULT_BWRAP)]
    bwrap: String,

    /// Print the bwrap command line instead of running it
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Profile name or command, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr so the sandboxed program owns stdout.
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    debug!("sbox v{}", env!("CARGO_PKG_VERSION"));

    let Some((name, rest)) = args.command.split_first() else {
        eprintln!("{}", Args::command().render_usage());
        return Ok(ExitCode::from(1));
    };

    let profiles = ProfileDir::new(&args.profile_dir);
    let (options, warnings) = profiles.resolve(name).into_options();
    if !warnings.is_empty() {
        info!(count = warnings.len(), "Profile problems were ignored");
    }
    if args.verbose {
        report(warnings);
    }

    let host = HostEnvironment::detect();
    let mut wrapper = BubbleWrapper::new().with_binary(&args.bwrap);
    let rejected = apply_profile(&options, &host, &mut wrapper);
    if !rejected.is_empty() {
        info!(count = rejected.len(), "Some profile directives were rejected");
    }
    if args.verbose {
        report(rejected);
    }

    let comm = select_command(&options, name);

    if args.dry_run {
        debug!(binary = wrapper.binary(), "Dry run, not executing");
        let line = render_command_line(&wrapper.command_line(comm, rest));
        writeln!(std::io::stdout(), "{line}").map_err(sbox::Error::from)?;
        return Ok(ExitCode::SUCCESS);
    }

    let status = wrapper.exec(comm, rest);
    Ok(ExitCode::from(exit_byte(status)))
}

/// Prints full diagnostics, including help text, for soft failures.
fn report<E: Into<sbox::Error>>(problems: Vec<E>) {
    for problem in problems {
        let error: sbox::Error = problem.into();
        eprintln!("{:?}", miette::Report::new(error));
    }
}

/// Maps a status to what the shell sees, so the launch sentinel becomes 255.
fn exit_byte(status: i32) -> u8 {
    u8::try_from(status.rem_euclid(256)).unwrap_or(u8::MAX)
}
