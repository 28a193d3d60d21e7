//! ogb binary entry point

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stderr)]

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = ogb::cli::parse();
    std::process::exit(ogb::run(cli));
}
