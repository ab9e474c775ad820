use std::sync::Arc;

use anyhow::{Context, bail};

use kiradopay_client::{
    ClientConfig, HttpLedgerGateway, SqliteReceiptBuffer, SyncManager, SyncWorker,
};
use kiradopay_core::EventCode;

const USAGE: &str = "usage: kiradopay-client <view|sync|watch> <EVENT>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiradopay_observability::init();

    let mut args = std::env::args().skip(1);
    let command = args.next().context(USAGE)?;
    let events = args
        .map(EventCode::parse)
        .collect::<Result<Vec<_>, _>>()
        .context("invalid event code")?;
    if events.is_empty() {
        bail!(USAGE);
    }

    let config = ClientConfig::from_env().context("failed to load configuration")?;
    let gateway = HttpLedgerGateway::from_config(&config)?;
    let buffer = SqliteReceiptBuffer::open(&config.buffer_path)
        .await
        .with_context(|| format!("failed to open buffer at {}", config.buffer_path.display()))?;
    let manager = Arc::new(SyncManager::new(gateway, buffer).with_batch_size(config.sync_batch));

    match command.as_str() {
        "view" => {
            for event in &events {
                let view = manager.view(event).await?;
                println!("{}", serde_json::to_string(&view)?);
            }
        }
        "sync" => {
            for event in &events {
                let report = manager.sync_event(event).await?;
                println!("{}", serde_json::to_string(&report)?);
            }
        }
        "watch" => {
            let worker = SyncWorker::new(manager, config.sync_interval());
            for event in events {
                worker.watch(event).await;
            }
            let stop = worker.shutdown_handle();
            let handle = worker.start();

            tokio::signal::ctrl_c().await?;
            stop.shutdown();
            handle.await?;
        }
        other => bail!("unknown command {other:?}; {USAGE}"),
    }
    Ok(())
}
