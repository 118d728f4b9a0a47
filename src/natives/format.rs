//! Java-compatible value-to-string conversion, shared by the print-stream natives,
//! `StringBuilder.append`, and the `StringConcatFactory` recipe interpreter (§4.5, §9).

use crate::class::descriptor::FieldDescriptor;
use crate::heap::{Instance, Object, ObjectHandle};
use crate::value::Value;

pub const BOXED_CLASSES: &[&str] = &[
    "java/lang/Integer",
    "java/lang/Long",
    "java/lang/Float",
    "java/lang/Double",
    "java/lang/Boolean",
    "java/lang/Character",
    "java/lang/Byte",
    "java/lang/Short",
];

pub fn is_boxed_class(class_name: &str) -> bool {
    BOXED_CLASSES.contains(&class_name)
}

/// `Double.toString`: integral values print with a trailing `.0`; everything else uses
/// the shortest round-tripping decimal representation (§4.5, §9).
pub fn java_double_to_string(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if value == value.trunc() && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

pub fn java_float_to_string(value: f32) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if value == value.trunc() && value.abs() < 1e7 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Renders a heap object the way `Object.toString`/`println` would: host strings as
/// themselves, boxed primitives via their `value` field, everything else as
/// `class_name@<hex identity hash>`.
pub fn object_to_display_string(handle: &ObjectHandle) -> String {
    handle.with(|obj| match obj {
        Object::StringObject(s) => s.clone(),
        Object::Instance(Instance { class_name, fields, .. }) if is_boxed_class(class_name) => {
            match fields.get("value").copied() {
                Some(v) => java_value_to_display_string(&v, None),
                None => format!("{}@{:x}", class_name, handle.identity_hash()),
            }
        }
        Object::Instance(Instance { class_name, .. }) => format!("{}@{:x}", class_name, handle.identity_hash()),
        Object::Array(_) => format!("{}@{:x}", handle.class_name(), handle.identity_hash()),
    })
}

/// Renders any operand-stack value the way Java source would print it. `handle` lets a
/// caller avoid re-locking an already-held object (pass `None` to look it up fresh).
pub fn java_value_to_display_string(value: &Value, handle: Option<&ObjectHandle>) -> String {
    java_value_to_display_string_as(value, handle, false)
}

/// Same as `java_value_to_display_string`, but renders an `Int` as the UTF-16 code
/// unit it represents (`println(char)`, `StringBuilder.append(char)`) rather than as a
/// decimal number when the call site's descriptor says so — an `Int` alone can't tell
/// `'A'` apart from the number `65`.
pub fn java_value_to_display_string_as(value: &Value, handle: Option<&ObjectHandle>, as_char: bool) -> String {
    match value {
        Value::Int(v) if as_char => char::from_u32(*v as u32).map(String::from).unwrap_or_default(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => java_float_to_string(*v),
        Value::Double(v) => java_double_to_string(*v),
        Value::Ref(None) => "null".to_string(),
        Value::Ref(Some(h)) => object_to_display_string(handle.unwrap_or(h)),
    }
}

/// True when a method descriptor's sole parameter is `char` — both `println`/`print`
/// and `StringBuilder.append` always take exactly one argument, so this is enough to
/// pick the right rendering without resolving an overload set.
pub fn first_param_is_char(descriptor: &str) -> bool {
    matches!(
        FieldDescriptor::parse_method(descriptor),
        Ok(FieldDescriptor::Method { args, .. }) if matches!(args.first(), Some(FieldDescriptor::Char))
    )
}
