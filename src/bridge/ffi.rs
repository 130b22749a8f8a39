//! C ABI entry points.
//!
//! All functions are safe to call from any host thread. Handles are plain
//! `int32_t` values; negative return values are error codes (see
//! [`Error::code`]). The calling thread's last failure is kept for
//! [`last_error_code`] and [`last_error_message`].
//!
//! Records returned by [`receipt_new`] are owned by the caller and must be
//! freed with [`receipt_free`], exactly once.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::OnceLock;

use crate::bridge::record::Receipt;
use crate::config::{load_config, load_from_env, BridgeConfig};
use crate::error::{Error, Result};
use crate::observability::logging::init_logging;
use crate::registry::Handle;
use crate::session::Session;

static SESSION: OnceLock<Session> = OnceLock::new();

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

// =============================================================================
// Helpers
// =============================================================================

/// Install `session` as the process-wide session used by the C ABI.
pub fn install_session(session: Session) -> Result<&'static Session> {
    SESSION.set(session).map_err(|_| Error::AlreadyInitialized)?;
    SESSION.get().ok_or(Error::NotInitialized)
}

/// The installed session.
pub fn session() -> Result<&'static Session> {
    SESSION.get().ok_or(Error::NotInitialized)
}

fn set_last_error(error: Error) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(error));
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "panic with non-string payload".to_string(),
        },
    }
}

/// Run one boundary operation: contain panics, log and record failures.
fn call<T>(operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let result = catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic))));
    if let Err(e) = &result {
        tracing::warn!(operation, code = e.code(), error = %e, "Boundary call failed");
        set_last_error(e.clone());
    }
    result
}

/// Borrow a C string argument.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a CStr> {
    if ptr.is_null() {
        return Err(Error::InvalidArgument(format!("{} is null", what)));
    }
    Ok(CStr::from_ptr(ptr))
}

/// Borrow a C string argument as UTF-8.
///
/// # Safety
/// Same as [`c_str`].
unsafe fn c_utf8<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    c_str(ptr, what)?
        .to_str()
        .map_err(|_| Error::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

fn start(endpoint: &str, config: BridgeConfig) -> Result<i32> {
    if SESSION.get().is_some() {
        return Err(Error::AlreadyInitialized);
    }
    init_logging(&config.observability.log_level);
    install_session(Session::connect(endpoint, config)?)?;
    Ok(0)
}

// =============================================================================
// Initialization
// =============================================================================

/// Connect to `endpoint` with configuration from `LEDGER_BRIDGE_CONFIG`, or
/// defaults.
///
/// Failures leave the client uninitialized and are reported through
/// [`last_error_code`].
///
/// # Safety
/// `endpoint` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn initialize_client(endpoint: *const c_char) {
    let _ = call("initialize_client", || {
        let endpoint = c_utf8(endpoint, "endpoint")?;
        start(endpoint, load_from_env()?)
    });
}

/// Connect to `endpoint` with configuration from the TOML file at `config_path`.
///
/// Returns 0 or a negative error code.
///
/// # Safety
/// Both arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn initialize_client_with_config(
    endpoint: *const c_char,
    config_path: *const c_char,
) -> i32 {
    call("initialize_client_with_config", || {
        let endpoint = c_utf8(endpoint, "endpoint")?;
        let path = c_utf8(config_path, "config path")?;
        start(endpoint, load_config(Path::new(path))?)
    })
    .unwrap_or_else(|e| e.code())
}

/// Derive a signer from `seed` and return its handle.
///
/// # Safety
/// `seed` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn initialize_signer(seed: *const c_char) -> i32 {
    call("initialize_signer", || {
        let seed = c_utf8(seed, "seed")?;
        session()?.initialize_signer(seed).map(i32::from)
    })
    .unwrap_or_else(|e| e.code())
}

// =============================================================================
// Submission
// =============================================================================

/// Submit the bytes of the NUL-terminated string `data` under `app_id`.
///
/// Returns a submission handle once the node accepted the transaction.
///
/// # Safety
/// `data` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn do_submit_data(signer: i32, data: *const c_char, app_id: i32) -> i32 {
    call("do_submit_data", || {
        let data = c_str(data, "data")?;
        session()?
            .submit_data(Handle::from_raw(signer), data.to_bytes(), app_id)
            .map(i32::from)
    })
    .unwrap_or_else(|e| e.code())
}

/// Submit `len` bytes at `data` under `app_id`. Payloads may contain NULs.
///
/// # Safety
/// `data` must point to `len` readable bytes, or be null when `len` is 0.
#[no_mangle]
pub unsafe extern "C" fn do_submit_bytes(signer: i32, data: *const u8, len: usize, app_id: i32) -> i32 {
    call("do_submit_bytes", || {
        let payload: &[u8] = if len == 0 {
            &[]
        } else if data.is_null() {
            return Err(Error::InvalidArgument("data is null".to_string()));
        } else {
            std::slice::from_raw_parts(data, len)
        };
        session()?
            .submit_data(Handle::from_raw(signer), payload, app_id)
            .map(i32::from)
    })
    .unwrap_or_else(|e| e.code())
}

/// Block until the submission is final and return its receipt handle.
#[no_mangle]
pub extern "C" fn get_transaction_receipt(submission: i32) -> i32 {
    call("get_transaction_receipt", || {
        session()?
            .transaction_receipt(Handle::from_raw(submission))
            .map(i32::from)
    })
    .unwrap_or_else(|e| e.code())
}

/// Abort a wait on `submission`. The waiting call returns the cancelled code.
#[no_mangle]
pub extern "C" fn submission_cancel(submission: i32) -> i32 {
    call("submission_cancel", || {
        session()?.cancel_submission(Handle::from_raw(submission))?;
        Ok(0)
    })
    .unwrap_or_else(|e| e.code())
}

// =============================================================================
// Receipt records
// =============================================================================

/// Copy the receipt behind `receipt` into a new caller-owned record.
///
/// Returns null on failure. Free the record with [`receipt_free`].
#[no_mangle]
pub extern "C" fn receipt_new(receipt: i32) -> *mut Receipt {
    call("receipt_new", || session()?.receipt_new(Handle::from_raw(receipt)))
        .map(|ptr| ptr.as_ptr())
        .unwrap_or(ptr::null_mut())
}

/// Free a record from [`receipt_new`]. The receipt handle stays valid.
///
/// Null, foreign and already-freed pointers are reported, never freed.
#[no_mangle]
pub extern "C" fn receipt_free(record: *mut Receipt) {
    let _ = call("receipt_free", || session()?.receipt_free(record));
}

/// Block height of an outstanding record, or -1.
#[no_mangle]
pub extern "C" fn receipt_block_height(record: *const Receipt) -> i32 {
    call("receipt_block_height", || session()?.with_record(record, |r| r.block_height)).unwrap_or(-1)
}

/// Transaction index of an outstanding record, or -1.
#[no_mangle]
pub extern "C" fn receipt_transaction_index(record: *const Receipt) -> i32 {
    call("receipt_transaction_index", || {
        session()?.with_record(record, |r| r.transaction_index)
    })
    .unwrap_or(-1)
}

/// The 32-byte block hash inside an outstanding record, or null.
///
/// Valid until the record is freed.
#[no_mangle]
pub extern "C" fn receipt_block_hash(record: *const Receipt) -> *const u8 {
    call("receipt_block_hash", || {
        session()?.with_record(record, |r| r.block_hash.as_ptr())
    })
    .unwrap_or(ptr::null())
}

/// The 32-byte transaction hash inside an outstanding record, or null.
///
/// Valid until the record is freed.
#[no_mangle]
pub extern "C" fn receipt_transaction_hash(record: *const Receipt) -> *const u8 {
    call("receipt_transaction_hash", || {
        session()?.with_record(record, |r| r.transaction_hash.as_ptr())
    })
    .unwrap_or(ptr::null())
}

// =============================================================================
// Handle release
// =============================================================================

#[no_mangle]
pub extern "C" fn signer_release(signer: i32) -> i32 {
    call("signer_release", || {
        session()?.release_signer(Handle::from_raw(signer))?;
        Ok(0)
    })
    .unwrap_or_else(|e| e.code())
}

/// Release a submission handle, cancelling any wait in flight.
#[no_mangle]
pub extern "C" fn submission_release(submission: i32) -> i32 {
    call("submission_release", || {
        session()?.release_submission(Handle::from_raw(submission))?;
        Ok(0)
    })
    .unwrap_or_else(|e| e.code())
}

#[no_mangle]
pub extern "C" fn receipt_release(receipt: i32) -> i32 {
    call("receipt_release", || {
        session()?.release_receipt(Handle::from_raw(receipt))?;
        Ok(0)
    })
    .unwrap_or_else(|e| e.code())
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Code of the calling thread's last failure, or 0.
#[no_mangle]
pub extern "C" fn last_error_code() -> i32 {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(0, Error::code))
}

/// Copy the calling thread's last error message into `buf`, NUL-terminated
/// and truncated to fit. Returns the number of bytes written before the NUL,
/// or -1 when `buf` is null or `len` is 0.
///
/// # Safety
/// `buf` must be null or point to `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn last_error_message(buf: *mut c_char, len: usize) -> i32 {
    if buf.is_null() || len == 0 {
        return -1;
    }
    let message = LAST_ERROR.with(|slot| slot.borrow().as_ref().map(Error::to_string).unwrap_or_default());
    let count = message.len().min(len - 1);
    ptr::copy_nonoverlapping(message.as_ptr(), buf.cast::<u8>(), count);
    *buf.add(count) = 0;
    count as i32
}
