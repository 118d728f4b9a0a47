//! Boxed-primitive natives: `Integer.valueOf` and its siblings, plus the instance
//! methods (`intValue`, `equals`, `hashCode`, `toString`, ...) that inspect the boxed
//! object's `value` field directly rather than resolving against a class file (§4.5).

use crate::error::VmOutcome;
use crate::heap::{Instance, Object, ObjectHandle};
use crate::natives::format::{java_double_to_string, java_float_to_string, java_value_to_display_string};
use crate::value::Value;

fn box_kind(class_name: &str) -> Option<&'static str> {
    Some(match class_name {
        "java/lang/Integer" => "I",
        "java/lang/Long" => "J",
        "java/lang/Float" => "F",
        "java/lang/Double" => "D",
        "java/lang/Boolean" => "Z",
        "java/lang/Character" => "C",
        "java/lang/Byte" => "B",
        "java/lang/Short" => "S",
        _ => return None,
    })
}

/// `Xxx.valueOf(prim) -> Xxx`.
pub fn dispatch_static(class_name: &str, method_name: &str, args: &[Value]) -> Option<Result<Option<Value>, VmOutcome>> {
    if method_name != "valueOf" || box_kind(class_name).is_none() {
        return None;
    }
    let value = *args.first()?;
    let handle = ObjectHandle::instance(class_name);
    handle.with_mut(|obj| {
        if let Object::Instance(Instance { fields, .. }) = obj {
            fields.insert("value".to_string(), value);
        }
    });
    Some(Ok(Some(Value::Ref(Some(handle)))))
}

fn field_value(receiver: &ObjectHandle) -> Option<Value> {
    receiver.with(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => fields.get("value").copied(),
        _ => None,
    })
}

pub fn dispatch_instance(
    receiver: &ObjectHandle,
    class_name: &str,
    method_name: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    box_kind(class_name)?;
    let value = field_value(receiver)?;

    let result = match method_name {
        "intValue" => Some(Value::Int(as_i64(value) as i32)),
        "longValue" => Some(Value::Long(as_i64(value))),
        "floatValue" => Some(Value::Float(as_f64(value) as f32)),
        "doubleValue" => Some(Value::Double(as_f64(value))),
        "booleanValue" => Some(Value::Int(value.as_int().unwrap_or(0))),
        "charValue" => Some(Value::Int(value.as_int().unwrap_or(0))),
        "byteValue" | "shortValue" => Some(Value::Int(as_i64(value) as i32)),
        "hashCode" => Some(Value::Int(box_hash_code(class_name, value))),
        "toString" => Some(Value::Ref(Some(ObjectHandle::string(java_value_to_display_string(&value, None))))),
        "equals" => {
            let other_equal = match args.first() {
                Some(Value::Ref(Some(other))) => {
                    other.class_name() == class_name && field_value(other) == Some(value)
                }
                _ => false,
            };
            Some(Value::from(other_equal))
        }
        "compareTo" => {
            let other = match args.first() {
                Some(Value::Ref(Some(other))) => match field_value(other) {
                    Some(v) => v,
                    None => return Some(Err(VmOutcome::Java(crate::except::null_pointer()))),
                },
                _ => return Some(Err(VmOutcome::Java(crate::except::null_pointer()))),
            };
            Some(Value::Int(compare(value, other)))
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn as_i64(value: Value) -> i64 {
    match value {
        Value::Int(v) => v as i64,
        Value::Long(v) => v,
        Value::Float(v) => v as i64,
        Value::Double(v) => v as i64,
        Value::Ref(_) => 0,
    }
}

fn as_f64(value: Value) -> f64 {
    match value {
        Value::Int(v) => v as f64,
        Value::Long(v) => v as f64,
        Value::Float(v) => v as f64,
        Value::Double(v) => v,
        Value::Ref(_) => 0.0,
    }
}

fn box_hash_code(class_name: &str, value: Value) -> i32 {
    match class_name {
        "java/lang/Long" => {
            let v = as_i64(value);
            (v ^ (v >> 32)) as i32
        }
        "java/lang/Float" => as_f64(value).to_string().parse::<f32>().unwrap_or(0.0).to_bits() as i32,
        "java/lang/Double" => {
            let bits = as_f64(value).to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        "java/lang/Boolean" => {
            if value.as_int().unwrap_or(0) != 0 {
                1231
            } else {
                1237
            }
        }
        _ => as_i64(value) as i32,
    }
}

fn compare(a: Value, b: Value) -> i32 {
    match (a, b) {
        (Value::Float(_), _) | (_, Value::Float(_)) | (Value::Double(_), _) | (_, Value::Double(_)) => {
            let (x, y) = (as_f64(a), as_f64(b));
            x.partial_cmp(&y).map(|o| o as i32).unwrap_or(0)
        }
        _ => {
            let (x, y) = (as_i64(a), as_i64(b));
            x.cmp(&y) as i32
        }
    }
}

pub fn display(value: Value) -> String {
    match value {
        Value::Float(v) => java_float_to_string(v),
        Value::Double(v) => java_double_to_string(v),
        other => java_value_to_display_string(&other, None),
    }
}
