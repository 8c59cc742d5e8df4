//! Integration Tests Runner
//!
//! This binary documents how to run the integration tests with proper setup

use anyhow::Result;

fn main() -> Result<()> {
    println!("Strata Integration Tests");
    println!("========================");
    println!();
    println!("Available tests:");
    println!("  - SQLite repository flows: cargo test --test repository_sqlite -- --nocapture");
    println!();
    println!("To run all integration tests:");
    println!("  cargo test -- --nocapture");

    Ok(())
}
