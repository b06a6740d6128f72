//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod settings;
pub mod util;
pub mod vms;

use vmplex_config::SettingsStore;
use vmplex_core::{Command as CoreCommand, Engine};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an engine-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    engine: &Engine,
    settings: &SettingsStore,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::List(args) => vms::list(engine, &args, global),
        Command::Watch(args) => vms::watch(engine, settings, &args, global).await,
        Command::Start(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::Start { guid }, global).await
        }
        Command::Stop(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::Stop { guid }, global).await
        }
        Command::TurnOff(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::TurnOff { guid }, global).await
        }
        Command::Save(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::Save { guid }, global).await
        }
        Command::Pause(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::Pause { guid }, global).await
        }
        Command::Reset(arg) => {
            let guid = util::resolve_vm(engine, &arg.vm)?;
            vms::change_state(engine, CoreCommand::Reset { guid }, global).await
        }
        // Settings and Completions are handled before dispatch
        Command::Settings(_) | Command::Completions(_) => unreachable!(),
    }
}
