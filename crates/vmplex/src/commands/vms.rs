//! VM command handlers: list, watch and state changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use vmplex_config::SettingsStore;
use vmplex_core::{
    Command as CoreCommand, CommandResult, EnabledState, Engine, VmEntry, VmFilter, VmGuid,
    VmSnapshot,
};

use crate::cli::{GlobalOpts, ListArgs, WatchArgs};
use crate::error::CliError;
use crate::output::{self, VmRow};

/// How long a state command waits for the change to be reported back.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

fn filters(args: &ListArgs) -> Vec<VmFilter> {
    let mut filters = Vec::new();
    if let Some(ref name) = args.name {
        filters.push(VmFilter::NameContains(name.clone()));
    }
    if args.running {
        filters.push(VmFilter::Running);
    }
    filters
}

fn select(entries: &[Arc<VmEntry>], filters: &[VmFilter]) -> Vec<VmSnapshot> {
    entries
        .iter()
        .filter(|entry| filters.iter().all(|f| f.matches(entry)))
        .map(|entry| entry.snapshot())
        .collect()
}

fn render(vms: &[VmSnapshot], global: &GlobalOpts) -> Result<String, CliError> {
    let color = output::should_color(&global.color);
    output::render_list(
        &global.output,
        vms,
        |vm| VmRow::new(vm, color),
        |vm| vm.guid.to_string(),
    )
}

pub fn list(engine: &Engine, args: &ListArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot = engine.snapshot();
    let vms = select(&snapshot, &filters(args));
    output::print_output(&render(&vms, global)?, global.quiet);
    Ok(())
}

/// Print the list on every change and removal notices on stderr until
/// interrupted, the duration elapses or enough updates were seen. The
/// settings file is reloaded when edited meanwhile.
pub async fn watch(
    engine: &Engine,
    settings: &SettingsStore,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut vms = engine.vms();
    let mut removals = engine.removals();

    if let Err(e) = settings.watch() {
        tracing::warn!(error = %e, "settings file will not be reloaded");
    }
    let mut reload_errors = settings.reload_errors();
    let mut settings_changes = settings.subscribe();

    let deadline = args.duration.map(|d| tokio::time::Instant::now() + d);
    let sleep = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(sleep);

    output::print_output(&render(&select(vms.current(), &[]), global)?, global.quiet);

    let mut updates = 0usize;
    loop {
        if args.count.is_some_and(|limit| updates >= limit) {
            break;
        }
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            () = &mut sleep => break,
            removed = removals.recv() => match removed {
                Ok(vm) => eprintln!("removed: {} ({})", vm.name(), vm.guid),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "removal notices dropped");
                }
                Err(RecvError::Closed) => break,
            },
            Ok(report) = reload_errors.recv() => eprintln!("warning: {report}"),
            Ok(()) = settings_changes.changed() => {
                tracing::info!(path = %settings.path().display(), "settings reloaded");
            }
            changed = vms.changed() => {
                let Some(list) = changed else { break };
                updates += 1;
                if !global.quiet {
                    let at = engine
                        .store()
                        .last_summary_update()
                        .map_or_else(
                            || "never".to_owned(),
                            |t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string(),
                        );
                    eprintln!("-- {} vms, metrics updated {at}", list.len());
                }
                output::print_output(&render(&select(&list, &[]), global)?, global.quiet);
            }
        }
    }
    Ok(())
}

pub async fn change_state(
    engine: &Engine,
    command: CoreCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let operation = command.operation();
    let guid = command.guid().clone();
    let target = command.requested_state().settled_state();
    let result = engine.execute(command).await?;

    let (vm, detail) = match result {
        CommandResult::JobStarted(vm) => {
            let detail = format!("{operation}: job started for '{}'", vm.name());
            (vm, detail)
        }
        CommandResult::Completed(before) => match settle(engine, &guid, target).await {
            Some(vm) => {
                let detail = format!("{operation}: '{}' is now {target}", vm.name());
                (vm, detail)
            }
            None => {
                let detail = format!(
                    "{operation}: request for '{}' completed; state not yet reported",
                    before.name()
                );
                (before, detail)
            }
        },
    };

    let out = output::render_single(&global.output, &vm, |_| detail.clone(), |vm| {
        vm.guid.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Wait until the mirrored entry reports `target`, as delivered by the
/// modification feed.
async fn settle(engine: &Engine, guid: &VmGuid, target: EnabledState) -> Option<VmSnapshot> {
    let mut vms = engine.vms();
    let wait = async {
        while let Some(entry) = engine.store().get(guid) {
            if entry.enabled_state() == target {
                return Some(entry.snapshot());
            }
            if vms.changed().await.is_none() {
                break;
            }
        }
        None
    };
    tokio::time::timeout(SETTLE_TIMEOUT, wait).await.ok().flatten()
}
