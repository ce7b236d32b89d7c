use serde::Serialize;

/// Identifier of a physical machine.
pub type PmId = u32;
/// Identifier of a virtual machine.
pub type VmId = u32;

/// Result of checking whether a virtual machine can be moved to a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    Success,
    HostNotFound,
    HostNotRunning,
    VmNotFound,
    VmNotRunning,
    WrongSource,
    AlreadyHosted,
}
