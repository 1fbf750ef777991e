//! Clear command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;

/// Drop the saved queue snapshot.
pub async fn execute(ctx: &CliContext) -> Result<()> {
    ctx.queue.clear().await;
    ctx.queue.flush().await;
    println!("✓ Cleared saved upload queue ({})", ctx.db_path.display());
    Ok(())
}
