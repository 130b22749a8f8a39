//! Cross-boundary surface.
//!
//! # Data Flow
//! ```text
//! host (C, Python ctypes, ...)
//!     → ffi.rs (C strings, null checks, panic containment, last error)
//!     → Session (handles in, handles out)
//!     → record.rs (caller-owned receipt records)
//! ```

pub mod ffi;
pub mod record;

pub use record::{Receipt, RecordLedger};
