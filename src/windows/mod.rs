//! Windows API layer backing the native memory accessor
//!
//! All unsafe FFI calls are contained within this module. The rest of the
//! crate only sees [`crate::memory::native::WindowsProcess`].

pub mod bindings;
pub mod handle;

pub use bindings::{kernel32, psapi};
pub use handle::Handle;
