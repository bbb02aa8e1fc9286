//! Loopback demo: two endpoints in one process, joined by an in-memory channel.
//!
//! The responder serves `increment`, whose inbound hook adds one to the first
//! argument before an echo callback returns it.
//!
//! ```bash
//! cargo run --bin tether-loopback -- --calls 8 --timeout-ms 500
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures_util::future::join_all;
use tether_rpc::channel::{MemoryChannel, ReceiveLoop};
use tether_rpc::{
    payload, Endpoint, FrameHandler, HookEntry, HookScope, Payload, Phase, RemoteConfig,
    RemoteRegistry, Value,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "tether-loopback")]
#[command(about = "Round-trips calls through the hook pipeline over an in-memory channel", long_about = None)]
struct Args {
    /// Number of concurrent calls to issue
    #[arg(short, long, default_value_t = 5, env = "TETHER_CALLS")]
    calls: i64,

    /// Log hook failures instead of failing the call
    #[arg(long, env = "TETHER_WARN_ON_HOOK_ERROR")]
    warn_on_hook_error: bool,

    /// Per-call deadline in milliseconds
    #[arg(long, env = "TETHER_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info,tether_rpc=debug", env = "TETHER_LOG")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Arc::new(RemoteConfig {
        default_call_timeout_ms: args.timeout_ms,
        warn_on_hook_error: args.warn_on_hook_error,
        ..RemoteConfig::default()
    });

    let ((initiator_chan, initiator_rx), (responder_chan, responder_rx)) =
        MemoryChannel::pair(config.channel_capacity);
    let initiator = Arc::new(RemoteRegistry::new(
        Endpoint::Initiator,
        Arc::new(initiator_chan),
        Arc::clone(&config),
    ));
    let responder = Arc::new(RemoteRegistry::new(
        Endpoint::Responder,
        Arc::new(responder_chan),
        Arc::clone(&config),
    ));
    let mut loops = [
        ReceiveLoop::start(initiator_rx, Arc::clone(&initiator) as Arc<dyn FrameHandler>),
        ReceiveLoop::start(responder_rx, Arc::clone(&responder) as Arc<dyn FrameHandler>),
    ];

    initiator.create("increment")?;
    responder
        .create("increment")?
        .register_inbound_hook(
            HookEntry::new(Phase::InboundPreDispatch, HookScope::Callee, |call| async move {
                let n = call
                    .payload
                    .first()
                    .and_then(Value::as_int)
                    .context("first argument must be an integer")?;
                Ok(payload![n + 1])
            })
            .named("increment"),
        )?
        .on_invoke(|args: Payload| async move { Ok(args) })?;

    initiator.start();
    responder.start();

    let calls: Vec<_> = (0..args.calls)
        .map(|n| initiator.invoke("increment", payload![n]))
        .collect();
    for (n, outcome) in (0..args.calls).zip(join_all(calls).await) {
        match outcome {
            Ok(result) => tracing::info!(sent = n, received = ?result.first(), "call resolved"),
            Err(err) => tracing::warn!(sent = n, error = %err, "call failed"),
        }
    }

    let cancelled = initiator.teardown() + responder.teardown();
    let mut delivered = 0;
    for receive_loop in &mut loops {
        delivered += receive_loop.stop().await;
    }
    tracing::info!(cancelled, delivered, "loopback finished");
    Ok(())
}
