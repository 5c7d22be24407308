use crate::config::Config;
use crate::scheduler::Scheduler;
use crate::state::SharedState;

pub async fn cmd_purge_tokens(config: Config) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;
    Scheduler::new(state).run_once().await?;

    println!("✓ Expired reset tokens and stale rate limit counters removed.");
    Ok(())
}
