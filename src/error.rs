//! The two error categories that must never be conflated (§7): a Java exception
//! participates in exception-table search and is catchable by Java code; a `VmError`
//! aborts the interpreter outright and is never visible to Java `catch` blocks.
//!
//! Both travel through the single discriminated `VmOutcome` type so every call site is
//! forced to decide which category it has — there is no code path where a Java
//! exception can be silently rewrapped as an uncatchable host error, or vice versa,
//! which design note §9 calls out as the most common regression of this kind.

use crate::heap::ObjectHandle;

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("class format error: {0}")]
    Format(String),
    #[error("class not found: {0}")]
    ClassNotFound(String),
    #[error("method resolution failed: {0}.{1}{2}")]
    NoSuchMethod(String, String, String),
    #[error("field resolution failed: {0}.{1}")]
    NoSuchField(String, String),
    #[error("malformed descriptor: {0}")]
    BadDescriptor(String),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("stack overflow: frame depth exceeded {0}")]
    StackOverflow(usize),
    #[error("branch target {0} is not an instruction boundary")]
    BadBranchTarget(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Either a VM abort or a Java exception in flight.
#[derive(Debug)]
pub enum VmOutcome {
    Vm(VmError),
    Java(ObjectHandle),
}

pub type VmResult<T> = Result<T, VmOutcome>;

impl From<VmError> for VmOutcome {
    fn from(e: VmError) -> Self {
        VmOutcome::Vm(e)
    }
}

impl From<std::io::Error> for VmOutcome {
    fn from(e: std::io::Error) -> Self {
        VmOutcome::Vm(VmError::Io(e))
    }
}

pub fn throw(exception: ObjectHandle) -> VmOutcome {
    VmOutcome::Java(exception)
}
