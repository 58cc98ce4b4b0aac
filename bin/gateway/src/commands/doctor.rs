//! Doctor Subcommand

use crate::flags::{GlobalArgs, StoreArgs, UpstreamArgs};
use clap::Parser;
use std::sync::Arc;
use weave_sources::UpstreamClient;
use weave_sync::Doctor;

/// The `doctor` Subcommand
///
/// Compares the store against the upstream hash list and prints the heights that are missing.
/// Exits with an error if any are.
///
/// # Usage
///
/// ```sh
/// weave-gateway doctor [FLAGS] [OPTIONS]
/// ```
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(about = "Reports heights missing from the store")]
pub struct DoctorCommand {
    /// Where the hash list is fetched from.
    #[command(flatten)]
    pub upstream: UpstreamArgs,
    /// The store to check.
    #[command(flatten)]
    pub store: StoreArgs,
}

impl DoctorCommand {
    /// Runs the subcommand.
    pub async fn run(self, _: GlobalArgs) -> anyhow::Result<()> {
        let upstream: Arc<dyn UpstreamClient> = Arc::new(self.upstream.build()?);
        let store = self.store.open().await?;
        let hashes = self.store.hash_list_cache().refresh(upstream.as_ref()).await?;
        let expected = hashes.len() as u64;
        let doctor = Doctor::new(store, upstream);

        let check = doctor.gap_check(expected).await?;
        println!("Expected heights: {expected}");
        match check.stored_top {
            Some(top) => println!("Stored top: {top}"),
            None => println!("Stored top: none"),
        }
        if !check.maybe_missing {
            println!("No missing heights");
            return Ok(());
        }

        let missing = doctor.find_missing_blocks(expected).await?;
        if missing.is_empty() {
            println!("No missing heights");
            return Ok(());
        }
        println!("Missing heights: {}", missing.len());
        for (from, to) in ranges(&missing) {
            if from == to {
                println!("  {from}");
            } else {
                println!("  {from}..={to}");
            }
        }
        anyhow::bail!("{} heights are missing", missing.len())
    }
}

/// Collapses sorted heights into inclusive runs.
fn ranges(heights: &[u64]) -> Vec<(u64, u64)> {
    let mut runs: Vec<(u64, u64)> = Vec::new();
    for &height in heights {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == height => *end = height,
            _ => runs.push((height, height)),
        }
    }
    runs
}
