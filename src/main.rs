//! Flowsmith CLI - automation builder and scheduler
//!
//! Run with: cargo run --bin flowsmith -- <command>
//! Or after build: ./target/release/flowsmith <command>

#[tokio::main]
async fn main() {
    // Load .env before anything reads credentials
    let _ = dotenvy::dotenv();

    // Run CLI (delegates to operations)
    if let Err(e) = flowsmith::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
