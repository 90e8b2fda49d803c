//! Subcommand implementations

use std::process::ExitStatus;

use anyhow::Context;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use leasehold_client::{Lease, LockClient, LockError, LockId};

/// Exit code when the lease was lost and the command was killed
pub const LEASE_LOST_EXIT_CODE: i32 = 75;

/// Exit code after an interrupt
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

enum Outcome {
    Exited(ExitStatus),
    LeaseLost(LockError),
    Interrupted,
}

async fn next_failure(failures: &mut Option<UnboundedReceiver<LockError>>) -> Option<LockError> {
    match failures {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run `command` while holding the lock; returns the exit code to use
///
/// The lease is released however supervision ends, errors included.
pub async fn run(client: &LockClient, id: LockId, command: &[String]) -> anyhow::Result<i32> {
    let (program, args) = command.split_first().context("no command given")?;

    let lease = client.acquire(id).await?;
    let result = supervise(&lease, program, args).await;
    lease.release().await;
    result
}

async fn supervise(lease: &Lease, program: &str, args: &[String]) -> anyhow::Result<i32> {
    let mut failures = lease.take_renewal_failures();
    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start '{}'", program))?;
    info!(lock = %lease.id(), pid = child.id(), command = %program, "Command started");

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status.context("failed to wait for command")?),
        Some(e) = next_failure(&mut failures) => Outcome::LeaseLost(e),
        _ = tokio::signal::ctrl_c() => Outcome::Interrupted,
    };

    let code = match outcome {
        Outcome::Exited(status) => {
            info!(lock = %lease.id(), %status, "Command finished");
            status.code().unwrap_or(1)
        }
        Outcome::LeaseLost(e) => {
            error!(lock = %lease.id(), error = %e, "Lease lost; killing command");
            child.kill().await.context("failed to kill command")?;
            LEASE_LOST_EXIT_CODE
        }
        Outcome::Interrupted => {
            warn!(lock = %lease.id(), "Interrupted; killing command");
            child.kill().await.context("failed to kill command")?;
            INTERRUPTED_EXIT_CODE
        }
    };
    Ok(code)
}

/// Print the stored record; exit code 1 when there is none
pub async fn inspect(client: &LockClient, id: LockId) -> anyhow::Result<i32> {
    match client.inspect(id.clone()).await? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            info!(lock = %id, "No lock record");
            Ok(1)
        }
    }
}
