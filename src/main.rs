mod commands;

use std::path::PathBuf;
use std::process;

use alloc_trap::{ForeignSignals, TracerConfig, TracerError, TrapKind};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "alloc-trap", about = "Breakpoint-based allocation tracing for HotSpot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a libjvm.so for the symbols the tracer needs
    Symbols { library: PathBuf },
    /// Trap in-process stand-ins for the allocation event functions
    Selftest {
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Calls per thread
        #[arg(long, default_value_t = 10_000)]
        allocations: u64,
        #[arg(long, value_enum, default_values_t = [Arm::InNewTlab])]
        arm: Vec<Arm>,
        /// Do not chain unknown SIGTRAPs to the previous handler
        #[arg(long)]
        ignore_foreign: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Arm {
    InNewTlab,
    OutsideTlab,
}

impl From<Arm> for TrapKind {
    fn from(value: Arm) -> Self {
        match value {
            Arm::InNewTlab => TrapKind::InNewTlab,
            Arm::OutsideTlab => TrapKind::OutsideTlab,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Symbols { library } => commands::symbols::run(&library),
        Command::Selftest {
            threads,
            allocations,
            arm,
            ignore_foreign,
        } => {
            let config = TracerConfig {
                armed: arm.into_iter().map(TrapKind::from).collect(),
                foreign_signals: if ignore_foreign {
                    ForeignSignals::Ignore
                } else {
                    ForeignSignals::Chain
                },
            };
            commands::selftest::run(commands::selftest::Options {
                threads,
                allocations,
                config,
            })
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<TracerError>() {
            Some(_) => {
                eprintln!("{}", e);
                process::exit(1);
            }
            None => Err(e),
        },
    }
}
