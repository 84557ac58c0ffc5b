//! Background removal web server
//!
//! Serves an upload form and replaces the background of uploaded photos with
//! black using a pretrained segmentation model.

#[cfg(feature = "cli")]
use noback::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
