//! C-ABI surface for embedding in a fuzzer harness: `init` / `start` / `stop`.
//!
//! The engine itself is safe Rust ([`crate::Engine`]); this module is only
//! the unsafe boundary that adapts it to a C-callable shape and owns the
//! single global instance a harness process needs.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::{Mutex, Once};

use crate::{Engine, EngineConfig};

static ENGINE: Mutex<Option<Engine>> = Mutex::new(None);
static LOG_INIT: Once = Once::new();

fn init_logger() {
    LOG_INIT.call_once(|| {
        env_logger::init();
    });
}

/// Build the COFI map for the target image and prepare the engine.
///
/// `image_path` must be a valid, NUL-terminated UTF-8 path. Exits the
/// process with a nonzero status on any fatal init error (PT unsupported,
/// unreadable image, size mismatch), after logging the cause.
///
/// # Safety
/// `image_path` must be a valid pointer to a NUL-terminated C string, alive
/// for the duration of this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn covpt_init(image_path: *const c_char, base: u64, max: u64, entry: u64) {
    init_logger();

    let path = unsafe { CStr::from_ptr(image_path) }
        .to_str()
        .unwrap_or_else(|err| {
            log::error!("image_path is not valid UTF-8: {err}");
            std::process::exit(1);
        });

    let config = EngineConfig::new(path, base, max, entry);
    match Engine::init(config) {
        Ok(engine) => {
            *ENGINE.lock().unwrap() = Some(engine);
        }
        Err(err) => {
            log::error!("fatal init error: {err}");
            std::process::exit(1);
        }
    }
}

/// Open a PT trace session on `pid`. No-op (with a logged error) if `init`
/// hasn't run.
///
/// # Safety
/// Must be called after a successful [`covpt_init`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn covpt_start(pid: libc::pid_t) {
    let mut guard = ENGINE.lock().unwrap();
    let Some(engine) = guard.as_mut() else {
        log::error!("covpt_start called before covpt_init");
        return;
    };
    if let Err(err) = engine.start(pid) {
        log::error!("failed to start trace session: {err}");
    }
}

/// Disable the trace session, decode it, and write the resulting bitmap to
/// `out_bitmap_ptr`. Writes exactly `map_size` bytes (the default, `2^16`,
/// unless a caller went through the Rust [`EngineConfig`] API directly).
///
/// # Safety
/// `out_bitmap_ptr` must point to at least `map_size` writable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn covpt_stop(out_bitmap_ptr: *mut u8) {
    let mut guard = ENGINE.lock().unwrap();
    let Some(engine) = guard.as_mut() else {
        log::error!("covpt_stop called before covpt_init");
        return;
    };
    let map_size = engine.map_size();
    // SAFETY: the caller contract requires `out_bitmap_ptr` to point to at
    // least `map_size` writable bytes.
    let out_bitmap = unsafe { std::slice::from_raw_parts_mut(out_bitmap_ptr, map_size) };
    if let Err(err) = engine.stop(out_bitmap) {
        log::error!("failed to stop trace session: {err}");
    }
}
