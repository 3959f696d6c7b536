//! `nvoc cast-graph <class>`: print every class embedded in a class.

use nvoc::ClassRegistry;

use super::{find_class, Context};

pub fn execute(ctx: &mut Context, query: &str) -> anyhow::Result<()> {
    let def = find_class(ClassRegistry::global()?, query)?;
    let out = &mut ctx.out;

    out.heading(&format!(
        "{} ({}, {} bytes, align {})",
        def.name(),
        def.id(),
        def.info.size,
        def.info.align
    ));
    for (idx, relative) in def.cast_info.iter().enumerate() {
        out.plain(&format!("  +{:<5} ", relative.offset));
        if idx == 0 {
            out.bold(relative.class_def.name());
            out.dim(" (self)");
        } else {
            out.info(relative.class_def.name());
        }
        out.plain(&format!(" {}", relative.class_id()));
        if relative.dtor.is_none() {
            out.dim(" no dtor");
        }
        out.newline();
    }
    out.flush();
    Ok(())
}
