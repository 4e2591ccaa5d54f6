//! upe CLI binary
//!
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    // cli::run() prints every outcome itself; main only maps to the exit code
    if let Err(code) = upe::cli::run() {
        std::process::exit(code.as_i32());
    }
}
