use aliaslang::driver::{Settings, process};
use aliaslang::source::SourceMap;

use clap::Parser;

use std::path::PathBuf;

/// Compiler for a small systems language whose buffer aliasing is checked at
/// compile time.
#[derive(Parser, Debug)]
#[command(name = "aliaslang")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source file to check
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Print the number of aliasing states reached after every line
    #[arg(short = 's', long = "states")]
    states: bool,

    /// Emit NASM assembly next to the input
    #[arg(short, long)]
    compile: bool,

    /// Assemble the emitted code with nasm (implies --compile)
    #[arg(short, long)]
    assemble: bool,

    /// Link the object file with gcc (implies --assemble)
    #[arg(short, long)]
    link: bool,

    /// Only emit functions, without wrapping top-level statements in main
    #[arg(long)]
    no_top_main: bool,

    /// Where to move the final artifact
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log pipeline progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let settings = Settings {
        input: args.input,
        output: args.output,
        print_states: args.states,
        compile: args.compile || args.assemble || args.link,
        assemble: args.assemble || args.link,
        link: args.link,
        top_main: !args.no_top_main,
    };

    let mut sources = SourceMap::new();
    if let Err(error) = process(&settings, &mut sources) {
        if error.report(&sources).is_err() {
            eprintln!("{}", error.summary());
        }
        std::process::exit(1);
    }
}
