use super::ui;
use crate::core::RateSnapshot;
use crate::worker::{Manager, WorkerState, WorkerStatus};
use anyhow::{Context, Result, bail};
use comfy_table::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const WARMUP_POLL: Duration = Duration::from_millis(100);
const WARMUP_GRACE: Duration = Duration::from_secs(1);

/// Cross-rate matrix between the tracked currencies.
pub fn display_rates(
    currencies: &[String],
    snapshots: &BTreeMap<String, Arc<RateSnapshot>>,
) -> String {
    let mut table = ui::new_styled_table();

    let mut header = vec![ui::header_cell("Base")];
    header.extend(currencies.iter().map(|c| ui::header_cell(c)));
    header.push(ui::header_cell("Provider updated"));
    header.push(ui::header_cell("Fetched at"));
    table.set_header(header);

    for base in currencies {
        let snapshot = snapshots.get(base);
        let mut row = vec![Cell::new(base)];
        for target in currencies {
            let rate = if target == base {
                snapshot.map(|_| 1.0)
            } else {
                snapshot.and_then(|s| s.rate(target))
            };
            row.push(ui::format_optional_cell(rate, |r| format!("{r:.4}")));
        }
        row.push(ui::format_optional_cell(snapshot, |s| {
            s.provider_updated_at.clone()
        }));
        row.push(ui::format_optional_cell(snapshot, |s| {
            s.fetched_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        }));
        table.add_row(row);
    }

    format!(
        "{}\n\n{}",
        ui::style_text("Exchange rates", ui::StyleType::Title),
        table
    )
}

pub fn display_status(status: &[WorkerStatus]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Worker"),
        ui::header_cell("State"),
        ui::header_cell("Attempts"),
        ui::header_cell("Successes"),
        ui::header_cell("Failures"),
    ]);

    for s in status {
        let state = match s.state {
            WorkerState::Created => ui::style_text("created", ui::StyleType::Subtle),
            WorkerState::Running => ui::style_text("running", ui::StyleType::Good),
            WorkerState::Stopped => ui::style_text("stopped", ui::StyleType::Subtle),
        };
        table.add_row(vec![
            Cell::new(&s.currency),
            Cell::new(state),
            ui::count_cell(s.attempts, false),
            ui::count_cell(s.successes, false),
            ui::count_cell(s.failures, true),
        ]);
    }

    table.to_string()
}

fn print_report(manager: &Manager) {
    println!(
        "{}",
        display_rates(manager.currencies(), &manager.get_all_rates())
    );
    println!("\n{}", display_status(&manager.worker_status()));
}

/// Keeps the workers running until Ctrl-C, then prints the cache.
pub async fn run_until_interrupted(manager: &Manager) -> Result<()> {
    let shutdown = CancellationToken::new();
    manager.start(shutdown.clone())?;

    println!(
        "Tracking {} every {}s. {}",
        manager.currencies().join(", "),
        manager.config().fetch_interval.as_secs_f64(),
        ui::style_text("Press Ctrl-C to stop.", ui::StyleType::Subtle)
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    shutdown.cancel();
    manager.stop().await;
    print_report(manager);
    Ok(())
}

/// Starts the workers, waits until each finished its first fetch, prints
/// the cache and stops.
pub async fn warm_and_print(manager: &Manager) -> Result<()> {
    manager.start(CancellationToken::new())?;

    let total = manager.currencies().len();
    let pb = ui::new_progress_bar(total as u64);
    pb.set_message("Fetching rates");

    let deadline = Instant::now() + manager.config().request_timeout + WARMUP_GRACE;
    loop {
        let status = manager.worker_status();
        let done = status
            .iter()
            .filter(|s| s.successes + s.failures > 0)
            .count();
        pb.set_position(done as u64);
        if done >= total || Instant::now() >= deadline {
            debug!(done, total, "Warm-up finished");
            break;
        }
        tokio::time::sleep(WARMUP_POLL).await;
    }
    pb.finish_and_clear();

    manager.stop().await;

    if manager.get_all_rates().is_empty() {
        println!("{}", display_status(&manager.worker_status()));
        bail!("No rates could be fetched for {}", manager.currencies().join(", "));
    }
    print_report(manager);
    Ok(())
}
