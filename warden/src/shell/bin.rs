// Binary entry point for warden.
// Thin wrapper over the library implementation.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = warden::shell::run().await {
        eprintln!("warden fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
