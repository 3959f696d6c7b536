//! `nvoc classes`: list the registered class hierarchy.

use nvoc::{ClassDef, ClassRegistry};
use serde::Serialize;

use super::Context;

#[derive(Debug, Serialize)]
struct ClassRow {
    id: String,
    name: &'static str,
    size: usize,
    align: usize,
    r#abstract: bool,
    ancestors: Vec<&'static str>,
    exports: usize,
}

impl ClassRow {
    fn of(def: &'static ClassDef) -> Self {
        Self {
            id: format!("{:#08x}", def.id().0),
            name: def.name(),
            size: def.info.size,
            align: def.info.align,
            r#abstract: def.is_abstract(),
            ancestors: def
                .cast_info
                .iter()
                .skip(1)
                .map(|relative| relative.class_def.name())
                .collect(),
            exports: def.export_info.len(),
        }
    }
}

pub fn execute(ctx: &mut Context, json: bool) -> anyhow::Result<()> {
    let rows: Vec<ClassRow> = ClassRegistry::global()?.iter().map(ClassRow::of).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let out = &mut ctx.out;
    out.heading(&format!(
        "{:<10} {:<20} {:>6} {:>7}  {}",
        "ID", "NAME", "SIZE", "EXPORTS", "ANCESTORS"
    ));
    for row in &rows {
        out.info(&format!("{:<10}", row.id));
        out.plain(" ");
        if row.r#abstract {
            out.dim(&format!("{:<20}", row.name));
        } else {
            out.bold(&format!("{:<20}", row.name));
        }
        out.plain(&format!(" {:>6} {:>7}  ", row.size, row.exports));
        out.plain(&row.ancestors.join(", "));
        out.newline();
    }
    out.dim(&format!("{} classes (dim: abstract)", rows.len()));
    out.newline();
    out.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvoc::Device;
    use nvoc::NvocClass;

    #[test]
    fn test_row_lists_ancestors_in_cast_order() {
        let row = ClassRow::of(Device::class_def());
        assert_eq!(row.id, "0xe0ac20");
        assert_eq!(row.ancestors, ["RsResource", "Object", "Notifier"]);
        assert!(!row.r#abstract);
        assert_eq!(row.exports, 7);

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["abstract"], false);
        assert_eq!(json["name"], "Device");
    }
}
