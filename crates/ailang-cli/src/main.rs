//! `ailang` command-line interface

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ailang", version, about = "The AILANG language runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Type-check and run a program's entrypoint
    Run {
        /// Entry `.ail` file
        file: PathBuf,
        /// Exported function to invoke
        #[arg(long, default_value = "main")]
        entry: String,
        /// JSON argument for a one-parameter entrypoint
        #[arg(long)]
        args_json: Option<String>,
        /// Capabilities to grant, comma-separated (IO,FS,Clock,Net,Env)
        #[arg(long)]
        caps: Option<String>,
        /// Dump lowered Core to stderr before evaluation
        #[arg(long)]
        trace: bool,
        /// Virtual clock start in milliseconds (implies determinism
        /// with --virtual-time)
        #[arg(long)]
        seed: Option<i64>,
        /// Use the deterministic virtual clock
        #[arg(long)]
        virtual_time: bool,
        /// Emit structured JSON reports on stdout
        #[arg(long)]
        json: bool,
        /// Compact JSON (one report per line)
        #[arg(long)]
        compact: bool,
    },
    /// Type-check a program without running it
    Check {
        /// Entry `.ail` file
        file: PathBuf,
        /// Emit structured JSON reports on stdout
        #[arg(long)]
        json: bool,
        /// Compact JSON (one report per line)
        #[arg(long)]
        compact: bool,
    },
    /// Print a module's normalized interface JSON
    Iface {
        /// Entry `.ail` file
        file: PathBuf,
        /// Compact JSON on a single line
        #[arg(long)]
        compact: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ok = match cli.command {
        Command::Run {
            file,
            entry,
            args_json,
            caps,
            trace,
            seed,
            virtual_time,
            json,
            compact,
        } => commands::run::run(
            &file,
            &entry,
            args_json.as_deref(),
            caps.as_deref(),
            trace,
            seed,
            virtual_time,
            json,
            compact,
        ),
        Command::Check { file, json, compact } => commands::check::check(&file, json, compact),
        Command::Iface { file, compact } => commands::iface::iface(&file, compact),
    };
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
