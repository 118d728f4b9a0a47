//! Native method dispatch (§4.5): a fixed set of `class.name:descriptor` triples
//! implemented in the host language rather than interpreted. Grouped by JDK area, one
//! submodule per area, composed here into the two entry points the invocation
//! subsystem (`crate::invoke`) consults before resolving and interpreting bytecode.

pub mod boxed;
pub mod collections;
pub mod format;
pub mod io;
pub mod lang;
pub mod string;

use crate::env::JavaEnv;
use crate::error::VmOutcome;
use crate::heap::ObjectHandle;
use crate::value::Value;

/// Placeholder owner of the dispatch tables; the tables themselves are free functions
/// grouped by area rather than a runtime registry, since most of them need direct
/// access to `JavaEnv`/heap state that a closure-based registry would just have to
/// capture anyway.
pub struct NativeTable;

impl NativeTable {
    pub fn new() -> Self {
        NativeTable
    }
}

impl Default for NativeTable {
    fn default() -> Self {
        NativeTable::new()
    }
}

/// `Some(_)` means the call was intercepted (`Ok(return_value)` or a raised exception);
/// `None` means it fell through to generic method resolution.
pub fn dispatch_static(
    env: &JavaEnv,
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    if method_name == "registerNatives" || method_name == "initIDs" {
        return Some(Ok(None));
    }
    boxed::dispatch_static(class_name, method_name, args)
        .or_else(|| string::dispatch_static(class_name, method_name, args))
        .or_else(|| collections::dispatch_static(env, class_name, method_name, args))
        .or_else(|| lang::dispatch_static(class_name, method_name, descriptor, args))
}

pub fn dispatch_instance(
    env: &JavaEnv,
    receiver: &ObjectHandle,
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    if method_name == "registerNatives" || method_name == "initIDs" {
        return Some(Ok(None));
    }
    if class_name == io::SENTINEL_CLASS {
        if let Some(r) = io::dispatch(env, method_name, descriptor, args) {
            return Some(r);
        }
    }
    if receiver.as_host_string().is_some() {
        if let Some(r) = string::dispatch_instance(receiver, method_name, args) {
            return Some(r);
        }
    }
    if string::is_builder_class(class_name) {
        if let Some(r) = string::dispatch_builder(receiver, method_name, descriptor, args) {
            return Some(r);
        }
    }
    boxed::dispatch_instance(receiver, class_name, method_name, args)
        .or_else(|| collections::dispatch_instance(env, receiver, class_name, method_name, args))
        .or_else(|| lang::dispatch_instance(receiver, method_name, descriptor, args))
}

/// Tried only after ordinary method resolution has failed to find a match (§4.4) — the
/// `Object` identity methods (`toString`/`equals`/`hashCode`/`getClass`) must never run
/// ahead of a real override.
pub fn dispatch_instance_fallback(
    receiver: &ObjectHandle,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    lang::dispatch_identity(receiver, method_name, descriptor, args)
}
