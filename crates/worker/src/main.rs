//! Dispatcher process entry point.
//!
//! Loads worker accounts from `RUNNINGHUB_ACCOUNTS` (a JSON array of
//! `{api_key, max_concurrency, workflows}` objects), starts the
//! orchestrator, and runs until interrupted. The messaging front end
//! connects to the [`Orchestrator`] handle; this binary only does the
//! wiring.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prodshot_core::Account;
use prodshot_dispatch::config::{parse_accounts, DispatchConfig};
use prodshot_dispatch::{AccountPool, Orchestrator};
use prodshot_runninghub::{ClientConfig, RunningHubClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prodshot_worker=debug,prodshot_dispatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let accounts_json = std::env::var("RUNNINGHUB_ACCOUNTS")
        .map_err(|_| anyhow::anyhow!("RUNNINGHUB_ACCOUNTS must be set"))?;
    let accounts = parse_accounts(&accounts_json)?;
    anyhow::ensure!(!accounts.is_empty(), "RUNNINGHUB_ACCOUNTS is empty");

    let client = Arc::new(RunningHubClient::new(ClientConfig::from_env()));

    let pool = Arc::new(AccountPool::new());
    for account in accounts {
        probe_account(&client, &account).await;
        pool.add_account(account).await;
    }

    let orchestrator = Orchestrator::start(pool, client, DispatchConfig::from_env());

    tracing::info!("Dispatcher running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    orchestrator.shutdown().await;
    Ok(())
}

/// Log each account's remote quota at startup. A failed probe is
/// reported but does not block the account: transient API trouble at
/// boot should not shrink the pool.
async fn probe_account(client: &RunningHubClient, account: &Account) {
    match client.api().account_status(account).await {
        Ok(status) => {
            tracing::info!(
                account_id = %account.id,
                remain_coins = status.remain_coins.as_deref().unwrap_or("?"),
                current_tasks = status.current_task_counts.as_deref().unwrap_or("?"),
                "Account status",
            );
        }
        Err(e) => {
            tracing::warn!(account_id = %account.id, error = %e, "Account status probe failed");
        }
    }
}
