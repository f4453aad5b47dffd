//! CLI command implementations.

mod api;
mod auth;

pub use api::get;
pub use auth::{login, logout, status, whoami};

use anyhow::Result;
use std::io::{self, Write};

/// Read one trimmed line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
