//! Single choke point for synthesizing Java exceptions (§9, "null-pointer generation"):
//! every `NullPointerException`, `ArithmeticException`, `ArrayIndexOutOfBoundsException`
//! and kin is built here so an interpreter-detected fault can never accidentally surface
//! as an uncatchable `VmError` instead of a catchable `VmOutcome::Java`.

use crate::heap::{Instance, ObjectHandle};
use crate::value::Value;

/// Builds a `{class_name, fields: {message: ...}}` exception object. This is the only
/// constructor interpreter code should use to raise a Java exception — wrap the result
/// with `error::throw()` into a `VmOutcome::Java`, never a bare `VmError`, for anything
/// a `catch` block is supposed to see.
pub fn new_exception(class_name: &str, message: Option<&str>) -> ObjectHandle {
    let handle = ObjectHandle::instance(class_name);
    handle.with_mut(|obj| {
        if let crate::heap::Object::Instance(Instance { fields, .. }) = obj {
            let message_value = match message {
                Some(text) => Value::Ref(Some(ObjectHandle::string(text))),
                None => Value::null(),
            };
            fields.insert("message".to_string(), message_value);
        }
    });
    handle
}

pub fn message_of(exception: &ObjectHandle) -> Option<String> {
    exception.with(|obj| match obj {
        crate::heap::Object::Instance(Instance { fields, .. }) => match fields.get("message") {
            Some(Value::Ref(Some(handle))) => handle.as_host_string(),
            _ => None,
        },
        _ => None,
    })
}

pub const NULL_POINTER: &str = "java/lang/NullPointerException";
pub const ARITHMETIC: &str = "java/lang/ArithmeticException";
pub const ARRAY_INDEX_OOB: &str = "java/lang/ArrayIndexOutOfBoundsException";
pub const NEGATIVE_ARRAY_SIZE: &str = "java/lang/NegativeArraySizeException";
pub const CLASS_CAST: &str = "java/lang/ClassCastException";
pub const ARRAY_STORE: &str = "java/lang/ArrayStoreException";
pub const STACK_OVERFLOW: &str = "java/lang/StackOverflowError";

pub fn null_pointer() -> ObjectHandle {
    new_exception(NULL_POINTER, None)
}

pub fn arithmetic(message: &str) -> ObjectHandle {
    new_exception(ARITHMETIC, Some(message))
}

pub fn array_index_oob(index: i32, length: usize) -> ObjectHandle {
    new_exception(ARRAY_INDEX_OOB, Some(&format!("Index {} out of bounds for length {}", index, length)))
}

pub fn negative_array_size(size: i32) -> ObjectHandle {
    new_exception(NEGATIVE_ARRAY_SIZE, Some(&size.to_string()))
}

pub fn class_cast(actual: &str, target: &str) -> ObjectHandle {
    new_exception(CLASS_CAST, Some(&format!("class {} cannot be cast to class {}", actual, target)))
}

pub fn array_store(message: &str) -> ObjectHandle {
    new_exception(ARRAY_STORE, Some(message))
}

pub fn stack_overflow() -> ObjectHandle {
    new_exception(STACK_OVERFLOW, None)
}
