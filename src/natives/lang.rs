//! Grab-bag natives that exist mainly to satisfy JDK bootstrap code: `Object`'s
//! identity methods, `Math`/`Float`/`Double` bit-level routines, `System.arraycopy`,
//! and the `Unsafe`/`VM`/`CDS`/`Reflection` stubs that return fixed values (§4.5).

use crate::error::{VmError, VmOutcome};
use crate::heap::{Instance, Object, ObjectHandle};
use crate::natives::format::object_to_display_string;
use crate::value::Value;

/// Tried *before* method resolution, so only the handful of triples that a real class
/// file could never plausibly override belong here: `Object.<init>` itself, and
/// `Throwable`'s message-populating constructors (every JDK/user exception or error
/// class is native-backed the same way, with no decoded `<init>` of its own to shadow).
/// `Object`'s identity methods (`toString`/`equals`/`hashCode`/`getClass`) are handled
/// by `dispatch_identity` instead, tried only once resolution has failed to find a
/// user override.
pub fn dispatch_instance(
    receiver: &ObjectHandle,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    match (method_name, descriptor) {
        ("desiredAssertionStatus", _) => Some(Ok(Some(Value::from(false)))),
        ("<init>", "()V") if receiver.class_name() == "java/lang/Object" => Some(Ok(None)),
        ("<init>", "()V") if looks_like_throwable(&receiver.class_name()) => message_init(receiver, None),
        ("<init>", "(Ljava/lang/String;)V") if looks_like_throwable(&receiver.class_name()) => {
            let message = match args.first() {
                Some(Value::Ref(Some(h))) => h.as_host_string(),
                _ => None,
            };
            message_init(receiver, message.as_deref())
        }
        ("getMessage", _) | ("getLocalizedMessage", _) if looks_like_throwable(&receiver.class_name()) => {
            Some(Ok(Some(match crate::except::message_of(receiver) {
                Some(text) => Value::Ref(Some(ObjectHandle::string(text))),
                None => Value::null(),
            })))
        }
        _ => None,
    }
}

/// `Object`'s identity methods, tried only as a fallback once method resolution has
/// failed to find a match — a class that overrides `toString`/`equals`/`hashCode`/
/// `getClass` must always win.
pub fn dispatch_identity(
    receiver: &ObjectHandle,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    match (method_name, descriptor) {
        ("hashCode", "()I") => Some(Ok(Some(Value::Int(receiver.identity_hash())))),
        ("equals", "(Ljava/lang/Object;)Z") => {
            let equal = match args.first() {
                Some(Value::Ref(Some(other))) => receiver.ptr_eq(other),
                _ => false,
            };
            Some(Ok(Some(Value::from(equal))))
        }
        ("toString", "()Ljava/lang/Object;") | ("toString", "()Ljava/lang/String;") => {
            Some(Ok(Some(Value::Ref(Some(ObjectHandle::string(object_to_display_string(receiver)))))))
        }
        ("getClass", _) => Some(Ok(Some(Value::Ref(Some(ObjectHandle::class_mirror(receiver.class_name())))))),
        _ => None,
    }
}

/// Named rather than gated on resolution failing first: every JDK exception/error
/// class shares this same `message`-field backing regardless of whether it happens to
/// carry a decoded class file, so there is no "real" `<init>`/`getMessage` to shadow
/// for these class names the way there is for `Object`'s identity methods.
fn looks_like_throwable(class_name: &str) -> bool {
    class_name == "java/lang/Throwable" || class_name.ends_with("Exception") || class_name.ends_with("Error")
}

/// `Throwable.<init>` variants populate the `message` field (§3, §4.5 supplement) so
/// `getMessage` and the uncaught-exception printer have something to show.
fn message_init(receiver: &ObjectHandle, message: Option<&str>) -> Option<Result<Option<Value>, VmOutcome>> {
    receiver.with_mut(|obj| {
        if let Object::Instance(Instance { fields, .. }) = obj {
            let value = match message {
                Some(text) => Value::Ref(Some(ObjectHandle::string(text))),
                None => Value::null(),
            };
            fields.insert("message".to_string(), value);
        }
    });
    Some(Ok(None))
}

pub fn dispatch_static(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    if method_name == "registerNatives" || method_name == "initIDs" {
        return Some(Ok(None));
    }

    match class_name {
        "java/lang/Math" | "java/lang/StrictMath" => math(method_name, args),
        "java/lang/Float" => match method_name {
            "floatToRawIntBits" | "floatToIntBits" => {
                Some(Ok(Some(Value::Int(args.first()?.as_float()?.to_bits() as i32))))
            }
            "intBitsToFloat" => Some(Ok(Some(Value::Float(f32::from_bits(args.first()?.as_int()? as u32))))),
            _ => None,
        },
        "java/lang/Double" => match method_name {
            "doubleToRawLongBits" | "doubleToLongBits" => {
                Some(Ok(Some(Value::Long(args.first()?.as_double()?.to_bits() as i64))))
            }
            "longBitsToDouble" => Some(Ok(Some(Value::Double(f64::from_bits(args.first()?.as_long()? as u64))))),
            _ => None,
        },
        "java/lang/System" => match method_name {
            "arraycopy" => Some(arraycopy(args)),
            "identityHashCode" => match args.first() {
                Some(Value::Ref(Some(h))) => Some(Ok(Some(Value::Int(h.identity_hash())))),
                _ => Some(Ok(Some(Value::Int(0)))),
            },
            "nanoTime" | "currentTimeMillis" => Some(Ok(Some(Value::Long(0)))),
            _ => None,
        },
        "jdk/internal/misc/Unsafe" | "sun/misc/Unsafe" => unsafe_stub(method_name, descriptor),
        "jdk/internal/misc/VM" | "sun/misc/VM" => vm_stub(method_name),
        "jdk/internal/misc/CDS" => Some(Ok(Some(Value::Int(0)))),
        "jdk/internal/reflect/Reflection" => match method_name {
            "getCallerClass" => Some(Ok(Some(Value::Ref(Some(ObjectHandle::class_mirror("java/lang/Object")))))),
            _ => None,
        },
        _ => None,
    }
}

fn math(method_name: &str, args: &[Value]) -> Option<Result<Option<Value>, VmOutcome>> {
    let as_double = |v: &Value| v.as_double().or_else(|| v.as_int().map(|i| i as f64));
    Some(Ok(Some(match method_name {
        "sqrt" => Value::Double(as_double(args.first()?)?.sqrt()),
        "pow" => Value::Double(as_double(args.first()?)?.powf(as_double(args.get(1)?)?)),
        "abs" => match args.first()? {
            Value::Int(v) => Value::Int(v.wrapping_abs()),
            Value::Long(v) => Value::Long(v.wrapping_abs()),
            Value::Float(v) => Value::Float(v.abs()),
            Value::Double(v) => Value::Double(v.abs()),
            _ => return None,
        },
        "max" => match (args.first()?, args.get(1)?) {
            (Value::Int(a), Value::Int(b)) => Value::Int(*a.max(b)),
            (Value::Long(a), Value::Long(b)) => Value::Long(*a.max(b)),
            (Value::Double(a), Value::Double(b)) => Value::Double(a.max(*b)),
            (Value::Float(a), Value::Float(b)) => Value::Float(a.max(*b)),
            _ => return None,
        },
        "min" => match (args.first()?, args.get(1)?) {
            (Value::Int(a), Value::Int(b)) => Value::Int(*a.min(b)),
            (Value::Long(a), Value::Long(b)) => Value::Long(*a.min(b)),
            (Value::Double(a), Value::Double(b)) => Value::Double(a.min(*b)),
            (Value::Float(a), Value::Float(b)) => Value::Float(a.min(*b)),
            _ => return None,
        },
        _ => return None,
    })))
}

fn arraycopy(args: &[Value]) -> Result<Option<Value>, VmOutcome> {
    let src = match args.first() {
        Some(Value::Ref(Some(h))) => h.clone(),
        Some(Value::Ref(None)) | None => return Err(VmOutcome::Java(crate::except::null_pointer())),
        _ => return Err(VmOutcome::Java(crate::except::array_store("src is not an array"))),
    };
    let src_pos = args.get(1).and_then(Value::as_int).ok_or_else(bad_args)?;
    let dst = match args.get(2) {
        Some(Value::Ref(Some(h))) => h.clone(),
        Some(Value::Ref(None)) | None => return Err(VmOutcome::Java(crate::except::null_pointer())),
        _ => return Err(VmOutcome::Java(crate::except::array_store("dst is not an array"))),
    };
    let dst_pos = args.get(3).and_then(Value::as_int).ok_or_else(bad_args)?;
    let length = args.get(4).and_then(Value::as_int).ok_or_else(bad_args)?;

    if !src.is_array() || !dst.is_array() {
        return Err(VmOutcome::Java(crate::except::array_store("arraycopy requires array arguments")));
    }

    let src_len = src.array_len().unwrap_or(0) as i32;
    let dst_len = dst.array_len().unwrap_or(0) as i32;
    if src_pos < 0 || dst_pos < 0 || length < 0 || src_pos + length > src_len || dst_pos + length > dst_len {
        return Err(VmOutcome::Java(crate::except::array_index_oob(src_pos, src_len as usize)));
    }

    let chunk: Vec<Value> = src.with(|obj| match obj {
        Object::Array(a) => a.elements[src_pos as usize..(src_pos + length) as usize].to_vec(),
        _ => Vec::new(),
    });
    dst.with_mut(|obj| {
        if let Object::Array(a) = obj {
            for (i, v) in chunk.into_iter().enumerate() {
                a.elements[dst_pos as usize + i] = v;
            }
        }
    });
    Ok(None)
}

fn bad_args() -> VmOutcome {
    VmOutcome::Vm(VmError::Format("arraycopy: malformed arguments".into()))
}

fn unsafe_stub(method_name: &str, _descriptor: &str) -> Option<Result<Option<Value>, VmOutcome>> {
    Some(Ok(Some(match method_name {
        "arrayBaseOffset" | "arrayBaseOffset0" => Value::Int(0),
        "arrayIndexScale" | "arrayIndexScale0" => Value::Int(1),
        "addressSize" | "addressSize0" => Value::Int(8),
        "compareAndSetInt" | "compareAndSetLong" | "compareAndSetReference" | "compareAndSetObject" => Value::from(true),
        "objectFieldOffset" | "objectFieldOffset1" | "staticFieldOffset" => Value::Long(0),
        "shouldBeInitialized" | "ensureClassInitialized" => return Some(Ok(None)),
        _ => return Some(Ok(None)),
    })))
}

fn vm_stub(method_name: &str) -> Option<Result<Option<Value>, VmOutcome>> {
    Some(Ok(Some(match method_name {
        "initLevel" => Value::Int(4),
        "isBooted" => Value::from(true),
        "getSavedProperty" => Value::null(),
        _ => return Some(Ok(None)),
    })))
}
