//! Automated session replay.
//!
//! Walks the tag log from a starting id and re-executes each recorded CLI
//! invocation through the normal command dispatcher, in strictly
//! increasing tag order --- every tag's recorded cursors assume all
//! earlier tags already replayed. A tag marking a driver initialization
//! boundary cannot be replayed automatically and halts the loop; the user
//! can resume later from a specific tag.

use anyhow::{Context, Result, bail};
use pmem_pbr::dcpmm::DRIVER_INIT_TAG_NAME;

use crate::context::SessionContext;
use crate::verbose::{dprintln, vprintln};

/// Message shown when a recorded tag needs a manual step.
pub const MANUAL_ACTION_REQUIRED: &str =
    "manual action required: this tag records a driver (re)initialization; \
     re-run playback with --tag to resume past it";

/// Replays every tag from `start_tag` to the end of the log.
///
/// # Errors
///
/// Fails when a tag cannot be fetched (no recorded data to substitute),
/// when a recorded invocation halts for manual action, or when a replayed
/// command itself fails.
pub fn execute_commands(ctx: &mut SessionContext, start_tag: u32) -> Result<()> {
    let count = ctx.session.tag_count();
    vprintln!("replaying tags {start_tag}..{count}");

    for id in start_tag..count {
        let tag = ctx
            .session
            .get_tag(id)
            .map_err(|e| anyhow::anyhow!("failed to get session tag {id}: {e}"))?;

        if tag.name == DRIVER_INIT_TAG_NAME {
            // Persist where we stopped so a later invocation can resume.
            ctx.state.tag_id = id;
            ctx.save()?;
            bail!("{MANUAL_ACTION_REQUIRED}");
        }

        ctx.state.tag_id = id;
        dprintln!("[tag {id}] {}", tag.name);
        crate::dispatch_replayed(ctx, &tag.name)
            .with_context(|| format!("replaying tag {id} ('{}')", tag.name))?;
    }

    Ok(())
}
