//! Shared low-level helpers.
//!
//! - [`io`] - bounds-checked little-endian codec primitives used by
//!   [`crate::module::ModuleIndex::to_bytes`] and [`crate::module::ModuleIndex::from_bytes`]

use std::any::Any;

pub mod io;

pub use io::{read_le_at, read_str_at, write_le, write_str, IndexIO};

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
