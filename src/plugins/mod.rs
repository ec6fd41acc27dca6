//! Built-in collection sources backed by sysinfo.
//!
//! These are the installed-package side of discovery: a static declaration
//! table the discovery pass registers before scanning the user plugin
//! directory.

mod cpu;
mod disk;
mod memory;
mod network;
mod processes;

pub use cpu::CpuSource;
pub use disk::DiskSource;
pub use memory::MemorySource;
pub use network::NetworkSource;
pub use processes::ProcessSource;

use crate::plugin::PluginDeclaration;

/// Declarations for all built-in sources.
pub fn builtin_declarations() -> Vec<PluginDeclaration> {
    vec![
        cpu::declaration(),
        memory::declaration(),
        network::declaration(),
        disk::declaration(),
        processes::declaration(),
    ]
}
