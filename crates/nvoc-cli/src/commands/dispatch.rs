//! `nvoc dispatch`: create a GPU and a device under the configured halspec and
//! call the device's controls through the export dispatcher.

use anyhow::Context as _;
use log::info;
use nvoc::classes::device::DeviceArgs;
use nvoc::classes::gpu::GpuArgs;
use nvoc::rtti::cast::class_of;
use nvoc::{
    invoke_control, merged_exports, obj_create, AccessRights, CreateFlags, Device, Dynamic,
    ExportFlags, Gpu, NvResult, ObjPtr,
};

use super::{Context, Owned};

/// Which controls to call
#[derive(Debug, Default)]
pub struct DispatchOptions {
    /// A single method id; every exported control when absent
    pub method: Option<u32>,
    /// Parameter buffer size; each control's declared size when absent
    pub size: Option<usize>,
}

/// One control call and its status
#[derive(Debug)]
struct CallRow {
    method_id: u32,
    name: &'static str,
    param_size: usize,
    result: NvResult<()>,
}

/// Parse a method id written as `0x...` or decimal
pub fn parse_method_id(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid method id '{}': {}", text, e))
}

/// Call the selected controls of `obj` with zeroed parameter buffers
fn dispatch(
    obj: ObjPtr<Dynamic>,
    options: &DispatchOptions,
    granted: AccessRights,
    disabled: ExportFlags,
) -> anyhow::Result<Vec<CallRow>> {
    let class_def = class_of(obj).context("object has no class metadata")?;
    let entries = merged_exports(class_def);

    let calls: Vec<(u32, &'static str, usize)> = match options.method {
        Some(method_id) => {
            let entry = entries.iter().find(|entry| entry.method_id == method_id);
            let size = options
                .size
                .or_else(|| entry.map(|entry| entry.param_size as usize))
                .unwrap_or(0);
            vec![(method_id, entry.map_or("(unknown)", |entry| entry.name), size)]
        }
        None => entries
            .iter()
            .map(|entry| {
                let size = options.size.unwrap_or(entry.param_size as usize);
                (entry.method_id, entry.name, size)
            })
            .collect(),
    };

    Ok(calls
        .into_iter()
        .map(|(method_id, name, param_size)| {
            let mut params = vec![0u8; param_size];
            let result = invoke_control(obj, method_id, &mut params, granted, disabled);
            CallRow {
                method_id,
                name,
                param_size,
                result,
            }
        })
        .collect())
}

pub fn execute(ctx: &mut Context, options: DispatchOptions) -> anyhow::Result<()> {
    let spec = ctx.config.halspec()?;
    let granted = ctx.config.granted_rights()?;
    let disabled = ctx.config.disabled_mask()?;
    info!("dispatching Device controls on {}", spec);

    let gpu = Owned(
        obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0))
            .with_context(|| format!("creating OBJGPU for {}", spec))?,
    );
    let device = Owned(
        obj_create::<Device>(
            Some(gpu.0.as_dynamic()),
            CreateFlags::NONE,
            DeviceArgs::new(1, 1, 0),
        )
        .context("creating Device")?,
    );

    let rows = dispatch(device.0.as_dynamic(), &options, granted, disabled)?;

    let out = &mut ctx.out;
    out.heading(&format!(
        "Device on {}: granted {}, disabled mask {}",
        spec, granted, disabled
    ));
    let mut ok = 0;
    for row in &rows {
        out.info(&format!("  {:#010x}", row.method_id));
        out.plain(&format!(" {:<46} {:>4}B ", row.name, row.param_size));
        match &row.result {
            Ok(()) => {
                ok += 1;
                out.success("NV_OK");
            }
            Err(err) => out.warning(&format!("{} ({:#x})", err, err.code())),
        }
        out.newline();
    }
    out.dim(&format!("{} of {} calls returned NV_OK", ok, rows.len()));
    out.newline();
    out.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;
    use nvoc::classes::device::ctrl;
    use nvoc::classes::object::{self, ObjectMeta};
    use nvoc::lifecycle::{destruct_dynamic, destruct_from_base, Construct};
    use nvoc::{
        obj_delete, read_param_u32, write_param_u32, CastInfo, Chip, ClassDef, ClassId, ClassInfo,
        DispIpVersion, ExportEntry, ExportInfo, HalSpec, Header, Metadata, NvocClass, NvocError,
        Object, RmVariant, Rtti, RuntimeConfig,
    };

    // ===== Device =====

    #[test]
    fn test_device_controls() {
        let spec = HalSpec::new(Chip::GA102, RmVariant::Vf, DispIpVersion::V04_00);
        let gpu = Owned(obj_create::<Gpu>(None, CreateFlags::NONE, GpuArgs::new(spec, 0)).unwrap());
        let device = Owned(
            obj_create::<Device>(
                Some(gpu.0.as_dynamic()),
                CreateFlags::NONE,
                DeviceArgs::new(1, 1, 0),
            )
            .unwrap(),
        );
        let obj = device.0.as_dynamic();

        let all = dispatch(obj, &DispatchOptions::default(), AccessRights::NONE, ExportFlags::NONE)
            .unwrap();
        assert_eq!(all.len(), merged_exports(Device::class_def()).len());
        let subdevices = all
            .iter()
            .find(|row| row.method_id == ctrl::GPU_GET_NUM_SUBDEVICES)
            .unwrap();
        assert_eq!(subdevices.result, Ok(()));

        let unknown = DispatchOptions {
            method: Some(0xdead),
            size: None,
        };
        let rows = dispatch(obj, &unknown, AccessRights::NONE, ExportFlags::NONE).unwrap();
        assert_eq!(rows[0].name, "(unknown)");
        assert_eq!(rows[0].result, Err(NvocError::NotSupported));

        let short = DispatchOptions {
            method: Some(ctrl::GPU_GET_NUM_SUBDEVICES),
            size: Some(3),
        };
        let rows = dispatch(obj, &short, AccessRights::NONE, ExportFlags::NONE).unwrap();
        assert_eq!(rows[0].result, Err(NvocError::InvalidParamStruct));

        let dma_flush = merged_exports(Device::class_def())
            .into_iter()
            .find(|entry| entry.method_id == ctrl::DMA_FLUSH)
            .unwrap();
        let flush = DispatchOptions {
            method: Some(ctrl::DMA_FLUSH),
            size: None,
        };
        let rows = dispatch(obj, &flush, AccessRights::NONE, dma_flush.flags).unwrap();
        assert_eq!(rows[0].result, Err(NvocError::NotSupported));
    }

    #[test]
    fn test_parse_method_id() {
        assert_eq!(parse_method_id("0x800280").unwrap(), ctrl::GPU_GET_NUM_SUBDEVICES);
        assert_eq!(parse_method_id("16").unwrap(), 16);
        assert!(parse_method_id("0xzz").is_err());
    }

    // ===== Access rights =====

    const DEBUG_COUNTER_ID: ClassId = ClassId(0xdeb0c1);
    const CTRL_READ_COUNTER: u32 = 0xdeb0_0001;

    type DebugCounterMeta = Metadata<(), ObjectMeta>;

    /// Object whose only control needs debug rights
    #[repr(C)]
    struct DebugCounter {
        header: Header<DebugCounterMeta>,
        object: Object,
        reads: u32,
    }

    fn ctrl_read_counter(obj: ObjPtr<Dynamic>, params: &mut [u8]) -> NvResult<()> {
        let mut counter = obj.cast::<DebugCounter>();
        counter.reads += 1;
        write_param_u32(params, 0, counter.reads)
    }

    static DEBUG_COUNTER_EXPORTS: [ExportEntry; 1] = [ExportEntry {
        method_id: CTRL_READ_COUNTER,
        name: "debugCtrlCmdReadCounter",
        access_rights: AccessRights::DEBUG,
        flags: ExportFlags::NONE,
        param_size: 4,
        func: Some(ctrl_read_counter),
        owner: &DEBUG_COUNTER_DEF.info,
    }];

    static DEBUG_COUNTER_EXPORT_INFO: ExportInfo = ExportInfo {
        entries: &DEBUG_COUNTER_EXPORTS,
    };

    static DEBUG_COUNTER_DEF: ClassDef = ClassDef {
        info: ClassInfo::of::<DebugCounter>(DEBUG_COUNTER_ID, "DebugCounter"),
        create_fn: None,
        cast_info: &DEBUG_COUNTER_CAST,
        export_info: &DEBUG_COUNTER_EXPORT_INFO,
    };

    static DEBUG_COUNTER_META: DebugCounterMeta = Metadata {
        rtti: Rtti {
            class_def: &DEBUG_COUNTER_DEF,
            dtor: Some(destruct_dynamic::<DebugCounter>),
            offset: 0,
        },
        vtable: (),
        base: Metadata {
            rtti: Rtti {
                class_def: &object::CLASS_DEF,
                dtor: Some(destruct_from_base),
                offset: offset_of!(DebugCounter, object),
            },
            vtable: (),
            base: (),
        },
    };

    static DEBUG_COUNTER_CAST: CastInfo = CastInfo {
        relatives: &[&DEBUG_COUNTER_META.rtti, &DEBUG_COUNTER_META.base.rtti],
    };

    unsafe impl NvocClass for DebugCounter {
        fn class_def() -> &'static ClassDef {
            &DEBUG_COUNTER_DEF
        }
    }

    nvoc::impl_static_cast!(DebugCounter => Object: object);

    impl Construct for DebugCounter {
        type Args = ();

        fn init(&mut self, _halspec: Option<&HalSpec>) {
            self.header.set(&DEBUG_COUNTER_META);
            self.object.init_level(&DEBUG_COUNTER_META.base);
        }

        fn construct(&mut self, _halspec: Option<&HalSpec>, _args: ()) -> NvResult<()> {
            self.object.ctor()
        }

        fn destruct(&mut self) {
            self.object.dtor();
        }
    }

    #[test]
    fn test_debug_control_refused_under_default_grant() {
        let counter = obj_create::<DebugCounter>(None, CreateFlags::NONE, ()).unwrap();
        let config = RuntimeConfig::default();
        let granted = config.granted_rights().unwrap();
        let disabled = config.disabled_mask().unwrap();

        let rows = dispatch(counter.as_dynamic(), &DispatchOptions::default(), granted, disabled)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result, Err(NvocError::InsufficientPermissions));
        assert_eq!(counter.reads, 0);

        let rows = dispatch(
            counter.as_dynamic(),
            &DispatchOptions::default(),
            granted.union(AccessRights::DEBUG),
            disabled,
        )
        .unwrap();
        assert_eq!(rows[0].result, Ok(()));
        assert_eq!(counter.reads, 1);

        let mut params = [0u8; 4];
        invoke_control(
            counter.as_dynamic(),
            CTRL_READ_COUNTER,
            &mut params,
            AccessRights::ALL,
            ExportFlags::NONE,
        )
        .unwrap();
        assert_eq!(read_param_u32(&params, 0).unwrap(), 2);

        unsafe { obj_delete(counter).unwrap() };
    }
}
