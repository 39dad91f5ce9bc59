//! Cabal Relayer Service
//!
//! Entry point for the Cabal gas relay.

use cabal_relayer::main_entry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    main_entry::run_server().await
}
