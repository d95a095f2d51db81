//! 具体渠道实现

pub mod console;
pub mod local_file;

pub use console::ConsoleSurface;
pub use local_file::{AlertLogEntry, LocalFileSurface};
