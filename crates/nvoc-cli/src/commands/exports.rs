//! `nvoc exports <class>`: print the merged control table of a class.

use nvoc::{merged_exports, AccessRights, ClassRegistry, ExportEntry, ExportFlags};
use serde::Serialize;

use super::{find_class, Context};

/// How a control would fare under the configured gating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Status {
    Enabled,
    CompiledOut,
    Disabled,
    NeedsRights,
}

impl Status {
    fn of(entry: &ExportEntry, disabled: ExportFlags, granted: AccessRights) -> Self {
        if entry.func.is_none() {
            Status::CompiledOut
        } else if !entry.is_enabled(disabled) {
            Status::Disabled
        } else if !granted.contains(entry.access_rights) {
            Status::NeedsRights
        } else {
            Status::Enabled
        }
    }

    fn label(self) -> &'static str {
        match self {
            Status::Enabled => "enabled",
            Status::CompiledOut => "compiled out",
            Status::Disabled => "disabled",
            Status::NeedsRights => "needs rights",
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportRow {
    method_id: String,
    name: &'static str,
    owner: &'static str,
    flags: String,
    access_rights: String,
    param_size: u32,
    status: Status,
}

fn rows(entries: &[&'static ExportEntry], disabled: ExportFlags, granted: AccessRights) -> Vec<ExportRow> {
    entries
        .iter()
        .map(|entry| ExportRow {
            method_id: format!("{:#x}", entry.method_id),
            name: entry.name,
            owner: entry.owner.name,
            flags: entry.flags.to_string(),
            access_rights: entry.access_rights.to_string(),
            param_size: entry.param_size,
            status: Status::of(entry, disabled, granted),
        })
        .collect()
}

pub fn execute(ctx: &mut Context, query: &str, json: bool) -> anyhow::Result<()> {
    let def = find_class(ClassRegistry::global()?, query)?;
    let disabled = ctx.config.disabled_mask()?;
    let granted = ctx.config.granted_rights()?;
    let rows = rows(&merged_exports(def), disabled, granted);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let out = &mut ctx.out;
    out.heading(&format!(
        "{}: {} controls (disabled mask {}, granted {})",
        def.name(),
        rows.len(),
        disabled,
        granted
    ));
    for row in &rows {
        out.info(&format!("  {:<10}", row.method_id));
        out.plain(&format!(
            " {:<46} {:<12} {:>4}B {:<10} ",
            row.name, row.owner, row.param_size, row.flags
        ));
        match row.status {
            Status::Enabled => out.success(row.status.label()),
            Status::NeedsRights => {
                out.warning(&format!("{} ({})", row.status.label(), row.access_rights))
            }
            Status::Disabled | Status::CompiledOut => out.dim(row.status.label()),
        }
        out.newline();
    }
    out.flush();
    Ok(())
}
