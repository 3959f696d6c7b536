//! `nvoc check`: validate the static metadata of every registered class.

use anyhow::bail;
use log::debug;
use nvoc::{validate_export_table, ClassDef, ClassRegistry};
use rustc_hash::FxHashSet;

use super::Context;

/// Every problem found in `def`'s cast graph and export tables
fn check_class(registry: &ClassRegistry, def: &'static ClassDef) -> Vec<String> {
    let mut problems = Vec::new();
    let name = def.name();

    match def.cast_info.iter().next() {
        Some(first) if first.class_id() == def.id() && first.offset == 0 => {}
        _ => problems.push(format!("{}: cast graph does not start with the class itself", name)),
    }

    let mut seen = FxHashSet::default();
    for relative in def.cast_info.iter() {
        let relative_def = relative.class_def;
        if !seen.insert(relative.class_id()) {
            problems.push(format!("{}: {} listed twice", name, relative_def.name()));
        }
        if !registry.contains(relative.class_id()) {
            problems.push(format!("{}: {} is not registered", name, relative_def.name()));
        }
        if relative.offset + relative_def.info.size > def.info.size {
            problems.push(format!(
                "{}: {} at +{} overruns {} bytes",
                name,
                relative_def.name(),
                relative.offset,
                def.info.size
            ));
        }
        if def.create_fn.is_some() && relative.dtor.is_none() {
            problems.push(format!("{}: {} has no destructor", name, relative_def.name()));
        }
        for inherited in relative_def.cast_info.iter() {
            if def.cast_info.find(inherited.class_id()).is_none() {
                problems.push(format!(
                    "{}: missing {} inherited through {}",
                    name,
                    inherited.class_def.name(),
                    relative_def.name()
                ));
            }
        }
    }

    problems.extend(
        validate_export_table(def)
            .into_iter()
            .map(|issue| issue.to_string()),
    );
    problems
}

pub fn execute(ctx: &mut Context) -> anyhow::Result<()> {
    let registry = ClassRegistry::global()?;
    let out = &mut ctx.out;
    let mut failures = 0;

    for def in registry.iter() {
        let problems = check_class(registry, def);
        debug!("{}: {} problem(s)", def.name(), problems.len());
        if problems.is_empty() {
            out.success("  ok   ");
            out.plain(def.name());
            out.newline();
        } else {
            failures += 1;
            out.error("  FAIL ");
            out.plain(def.name());
            out.newline();
            for problem in &problems {
                out.dim(&format!("        {}", problem));
                out.newline();
            }
        }
    }
    out.flush();

    if failures > 0 {
        bail!("{} of {} classes failed validation", failures, registry.len());
    }
    out.success(&format!("{} classes valid", registry.len()));
    out.newline();
    out.flush();
    Ok(())
}
