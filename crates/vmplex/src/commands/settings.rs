//! Settings command handlers.

use std::fmt::Write as _;

use vmplex_config::{Settings, SettingsStore, VmConfig};
use vmplex_core::VmGuid;

use crate::cli::{GlobalOpts, SettingsArgs, SettingsCommand};
use crate::error::CliError;
use crate::output;

pub fn handle(
    args: SettingsArgs,
    store: &SettingsStore,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SettingsCommand::Path => {
            output::print_output(&store.path().display().to_string(), global.quiet);
            Ok(())
        }
        SettingsCommand::Show => {
            let settings = store.settings();
            let out = output::render_single(&global.output, &*settings, detail, |s| {
                s.virtual_machines
                    .iter()
                    .map(|vm| vm.guid.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        SettingsCommand::SetDebugger { vm, arguments } => {
            let guid = find_vm(&store.settings(), &vm)?;
            store.mutate(|settings| {
                if let Some(entry) = settings
                    .virtual_machines
                    .iter_mut()
                    .find(|entry| entry.guid == guid)
                {
                    entry.debugger_arguments = arguments;
                }
            })?;
            if !global.quiet {
                eprintln!("Updated debugger arguments for {guid}");
            }
            Ok(())
        }
    }
}

fn find_vm(settings: &Settings, identifier: &str) -> Result<VmGuid, CliError> {
    let guid = VmGuid::new(identifier);
    settings
        .virtual_machines
        .iter()
        .find(|vm| vm.guid == guid || vm.name.eq_ignore_ascii_case(identifier))
        .map(|vm| vm.guid.clone())
        .ok_or_else(|| CliError::NotFound {
            resource_type: "vm".into(),
            identifier: identifier.into(),
            list_command: "settings show".into(),
        })
}

fn detail(settings: &Settings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Debugger:      {}", settings.debugger);
    let _ = writeln!(out, "Font size:     {}", settings.font_size);
    let _ = writeln!(out, "Compact mode:  {}", settings.compact_mode);
    let _ = writeln!(out, "Poll interval: {}", settings.sync.poll_interval);
    let _ = writeln!(out, "Managed class: {}", settings.sync.managed_category);
    if settings.virtual_machines.is_empty() {
        out.push_str("Known VMs:     none");
        return out;
    }
    out.push_str("Known VMs:");
    for vm in &settings.virtual_machines {
        out.push('\n');
        out.push_str(&vm_line(vm));
    }
    out
}

fn vm_line(vm: &VmConfig) -> String {
    let size = vm
        .rdp_settings
        .as_ref()
        .map(|rdp| {
            let (w, h) = rdp.effective_desktop_size();
            format!("  rdp {w}x{h}")
        })
        .unwrap_or_default();
    if vm.debugger_arguments.is_empty() {
        format!("  {}  {}{size}", vm.guid, vm.name)
    } else {
        format!("  {}  {}  [{}]{size}", vm.guid, vm.name, vm.debugger_arguments)
    }
}
