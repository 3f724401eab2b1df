//! Raw `perf_event_open` ABI bindings used by [`crate::session`].
//!
//! Field names and offsets mirror `linux/perf_event.h`. Only what the PT
//! session controller needs is modelled; sample-record parsing (the bulk of
//! what a general-purpose perf reader exposes) is out of scope here.

use core::ffi::c_ulong;

/// `PERF_TYPE_*` is platform-specific for PT: the actual value is read from
/// `/sys/bus/event_source/devices/intel_pt/type` at runtime.
pub const INTEL_PT_TYPE_FILE: &str = "/sys/bus/event_source/devices/intel_pt/type";

/// `config` bit 11: disable compression of return addresses ("noretcomp").
pub const PT_CONFIG_NORETCOMP: u64 = 1 << 11;

pub const ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const ATTR_FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
pub const ATTR_FLAG_ENABLE_ON_EXEC: u64 = 1 << 12;

/// `perf_event_attr`, sized through the `sig_data` field (`PERF_ATTR_SIZE_VER7`).
///
/// Zero-initialize unused union members; the kernel only interprets the ones
/// implied by `flags`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PerfEventAttr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub bp_addr_or_config1: u64,
    pub bp_len_or_config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
    pub sig_data: u64,
}

impl PerfEventAttr {
    /// A PT attr: `exclude_kernel=1`, `disabled=1`, `enable_on_exec=1`,
    /// `config = noretcomp`. All other fields zeroed.
    #[must_use]
    pub fn intel_pt(pt_type: u32) -> Self {
        Self {
            type_: pt_type,
            size: core::mem::size_of::<Self>() as u32,
            config: PT_CONFIG_NORETCOMP,
            sample_period_or_freq: 0,
            sample_type: 0,
            read_format: 0,
            flags: ATTR_FLAG_DISABLED | ATTR_FLAG_EXCLUDE_KERNEL | ATTR_FLAG_ENABLE_ON_EXEC,
            wakeup_events_or_watermark: 0,
            bp_type: 0,
            bp_addr_or_config1: 0,
            bp_len_or_config2: 0,
            branch_sample_type: 0,
            sample_regs_user: 0,
            sample_stack_user: 0,
            clockid: 0,
            sample_regs_intr: 0,
            aux_watermark: 0,
            sample_max_stack: 0,
            __reserved_2: 0,
            aux_sample_size: 0,
            __reserved_3: 0,
            sig_data: 0,
        }
    }
}

/// `perf_event_mmap_page`, the header page mapped at offset 0 of the fd.
///
/// Bitfield capability flags (`cap_user_time`, etc.) and the pmc/time-scaling
/// fields are not needed here and are folded into `capabilities`/reserved
/// padding so the byte layout up to `data_head` (offset 1024) matches the
/// kernel struct exactly.
#[repr(C)]
pub struct PerfEventMmapPage {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    __reserved: [u8; 118 * 8 + 4],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub aux_head: u64,
    pub aux_tail: u64,
    pub aux_offset: u64,
    pub aux_size: u64,
}

const _: () = assert!(core::mem::size_of::<PerfEventMmapPage>() == 1088);

/// `ioctl(2)` request numbers for `PERF_EVENT_IOC_*`, encoded via the
/// standard `_IO('$', nr)` macro (`'$'` = 0x24).
pub const PERF_EVENT_IOC_ENABLE: c_ulong = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: c_ulong = 0x2401;
pub const PERF_EVENT_IOC_RESET: c_ulong = 0x2403;

/// `perf_event_open(2)` syscall wrapper. Returns the raw fd or a negated
/// `errno` on failure, matching the raw syscall's contract.
///
/// # Safety
/// `attr` must be a validly initialized [`PerfEventAttr`].
pub unsafe fn perf_event_open(
    attr: *const PerfEventAttr,
    pid: libc::pid_t,
    cpu: libc::c_int,
    group_fd: libc::c_int,
    flags: libc::c_ulong,
) -> libc::c_long {
    unsafe { libc::syscall(libc::SYS_perf_event_open, attr, pid, cpu, group_fd, flags) }
}
