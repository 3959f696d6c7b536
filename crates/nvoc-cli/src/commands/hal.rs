//! `nvoc hal`: bind the built-in engines to a halspec and show the result.

use anyhow::{anyhow, Context as _};
use log::info;
use nvoc::classes::device::DeviceArgs;
use nvoc::classes::gpu::GpuArgs;
use nvoc::{
    obj_create, Chip, CreateFlags, Device, DispIpVersion, Gpu, HalSpec, KernelBif, PdbProperty,
    PropertySet, RmVariant, SlotBinding,
};

use super::{Context, Owned};
use crate::output::StyledOutput;

/// Classifier overrides from the command line
#[derive(Debug, Default)]
pub struct HalOptions {
    pub chip: Option<String>,
    pub variant: Option<String>,
    pub disp: Option<String>,
}

/// Configured halspec with command-line overrides applied
fn resolve_halspec(base: HalSpec, options: &HalOptions) -> anyhow::Result<HalSpec> {
    let mut spec = base;
    if let Some(chip) = &options.chip {
        spec.chip = chip.parse::<Chip>().map_err(|e| anyhow!(e))?;
    }
    if let Some(variant) = &options.variant {
        spec.rm_variant = variant.parse::<RmVariant>().map_err(|e| anyhow!(e))?;
    }
    if let Some(disp) = &options.disp {
        spec.disp_ip = disp.parse::<DispIpVersion>().map_err(|e| anyhow!(e))?;
    }
    Ok(spec)
}

pub fn execute(ctx: &mut Context, options: HalOptions) -> anyhow::Result<()> {
    let spec = resolve_halspec(ctx.config.halspec()?, &options)?;
    info!("binding built-in engines for {}", spec);

    let gpu = Owned(
        obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0))
            .with_context(|| format!("creating OBJGPU for {}", spec))?,
    );
    let bif = Owned(
        obj_create::<KernelBif>(Some(gpu.0.as_dynamic()), CreateFlags::NONE, ())
            .context("creating KernelBif")?,
    );
    // Dropped in reverse, so children are deleted before the GPU.
    let device = Owned(
        obj_create::<Device>(
            Some(gpu.0.as_dynamic()),
            CreateFlags::NONE,
            DeviceArgs::new(1, 1, 0),
        )
        .context("creating Device")?,
    );

    let out = &mut ctx.out;
    out.heading(&format!("halspec {} (family {})", spec, spec.family()));
    out.newline();

    print_bindings(out, "OBJGPU", &gpu.0.hal_bindings());
    print_properties(out, gpu.0.properties());
    out.newline();
    print_bindings(out, "KernelBif", &bif.0.hal_bindings());
    print_properties(out, bif.0.properties());
    out.newline();
    print_bindings(out, "Device", &device.0.hal_bindings());
    out.flush();
    Ok(())
}

fn print_bindings(out: &mut StyledOutput, class: &str, bindings: &[SlotBinding]) {
    out.bold(class);
    out.newline();
    for binding in bindings {
        out.plain(&format!("  {:<44} ", binding.method));
        match binding.variant {
            Some(variant) if is_stub(variant) => out.dim(&format!("{} (stub)", variant)),
            Some(variant) => out.success(variant),
            None => out.error("unbound"),
        }
        out.newline();
    }
}

fn print_properties<P: PdbProperty>(out: &mut StyledOutput, properties: PropertySet<P>) {
    let set: Vec<&str> = properties.iter_set().map(|property| property.name()).collect();
    out.plain("  properties: ");
    if set.is_empty() {
        out.dim("none");
    } else {
        out.info(&set.join(" "));
    }
    out.newline();
}

/// Shared stub bodies are tagged with a short hex hash instead of a chip
fn is_stub(variant: &str) -> bool {
    variant.len() == 6 && variant.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
