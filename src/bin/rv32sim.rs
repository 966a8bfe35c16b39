use clap::Parser;
use clap_num::maybe_hex;
use std::io;
use std::process::ExitCode;

use rv32_tomasulo_sim::loader;
use rv32_tomasulo_sim::Simulator;

/// Cycle-level Tomasulo-style out-of-order simulator for RV32I
///
/// Reads a hex-dump memory image from stdin (whitespace-separated `@addr`
/// and byte tokens), runs it to the terminator instruction, and prints the
/// low byte of a0 in decimal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Seed the cycle-order RNG so a run can be replayed bit-for-bit
    /// (use 0x prefix for hexadecimal)
    #[arg(long, value_parser=maybe_hex::<u64>)]
    seed: Option<u64>,

    /// Abort if the terminator hasn't committed after this many cycles
    /// (use 0x prefix for hexadecimal)
    #[arg(long, value_parser=maybe_hex::<u64>)]
    max_cycles: Option<u64>,

    /// Raise log verbosity to trace for this run
    #[arg(long)]
    trace: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.trace {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();

    let mut sim = Simulator::new(args.seed);

    if let Err(e) = loader::load(io::stdin(), sim.memory_mut()) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    let mut cycles = 0u64;
    loop {
        if let Some(result) = sim.step() {
            println!("{result}");
            return ExitCode::SUCCESS;
        }
        cycles += 1;
        if let Some(max) = args.max_cycles {
            if cycles >= max {
                eprintln!("error: exceeded --max-cycles={max} without committing the terminator");
                return ExitCode::FAILURE;
            }
        }
    }
}
