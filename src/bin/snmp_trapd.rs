//! snmp-trapd: receive SNMPv3 notifications and print them as JSON lines.

use std::collections::HashMap;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use snmp_trapd::cli::args::Args;
use snmp_trapd::cli::output::{OutputContext, write_metrics};
use snmp_trapd::{DecodedTrap, TrapKey, TrapStateStore, encode_hex};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    args.output.init_tracing();

    let builder = match args.receiver_builder() {
        Ok(builder) => builder,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let receiver = match builder.build().await {
        Ok(receiver) => receiver,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        target: "snmp_trapd::dispatch",
        {
            snmp.local_addr = %receiver.local_addr(),
            engine_id = %encode_hex(receiver.engine_id())
        },
        "listening"
    );

    let cancel = receiver.cancel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        cancel.cancel();
    });

    // Stopped only after the workers have drained, so late traps still print
    let done = CancellationToken::new();
    let printer = tokio::spawn(print_new_traps(
        receiver.store().clone(),
        OutputContext::new(!args.output.no_hints),
        Duration::from_millis(args.output.poll_ms.max(1)),
        done.clone(),
    ));

    let result = receiver.run().await;
    done.cancel();
    if let Err(e) = printer.await {
        tracing::error!(error = %e, "printer task failed");
    }

    if args.output.stats {
        if let Err(e) = write_metrics(&mut std::io::stdout().lock(), &receiver.metrics()) {
            tracing::error!(error = %e, "failed to write counters");
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Poll the store and print every entry replaced since the last poll.
async fn print_new_traps(
    store: Arc<TrapStateStore>,
    output: OutputContext,
    period: Duration,
    done: CancellationToken,
) {
    let mut seen: HashMap<TrapKey, Arc<DecodedTrap>> = HashMap::new();
    let mut ticker = tokio::time::interval(period);
    loop {
        let stop = tokio::select! {
            _ = ticker.tick() => false,
            _ = done.cancelled() => true,
        };

        let snapshot = store.snapshot();
        let mut stdout = std::io::stdout().lock();
        let mut fresh: Vec<&Arc<DecodedTrap>> = snapshot
            .iter()
            .filter(|(key, trap)| !seen.get(*key).is_some_and(|old| Arc::ptr_eq(old, trap)))
            .map(|(_, trap)| trap)
            .collect();
        fresh.sort_by_key(|trap| trap.received_at);
        for trap in fresh {
            if let Err(e) = output.write_trap(&mut stdout, trap) {
                tracing::error!(error = %e, "failed to write trap");
            }
        }
        let _ = stdout.flush();
        drop(stdout);
        seen = snapshot;

        if stop {
            break;
        }
    }
}
