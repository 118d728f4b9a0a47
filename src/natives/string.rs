//! `String`, `StringBuilder`/`StringBuffer`, and the `StringConcatFactory` recipe
//! interpreter (§4.5, §9). Host JDK strings are plain Rust `String`s wrapped in
//! `Object::StringObject`; `StringBuilder` keeps its buffer in a `_buffer` field holding
//! a `Value::Ref` to one of those.

use crate::error::VmOutcome;
use crate::heap::{Instance, Object, ObjectHandle};
use crate::natives::format::{first_param_is_char, java_value_to_display_string, java_value_to_display_string_as};
use crate::value::Value;

fn arg_string(value: &Value) -> Option<String> {
    match value {
        Value::Ref(Some(h)) => h.as_host_string(),
        _ => None,
    }
}

pub fn dispatch_instance(
    receiver: &ObjectHandle,
    method_name: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    let text = receiver.as_host_string()?;
    let chars: Vec<char> = text.chars().collect();

    let result = match method_name {
        "length" => Some(Value::Int(chars.len() as i32)),
        "isEmpty" => Some(Value::from(chars.is_empty())),
        "charAt" => {
            let idx = args.first()?.as_int()? as usize;
            match chars.get(idx) {
                Some(c) => Some(Value::Int(*c as i32)),
                None => return Some(Err(VmOutcome::Java(crate::except::new_exception(
                    "java/lang/StringIndexOutOfBoundsException",
                    Some(&format!("index {}, length {}", idx, chars.len())),
                )))),
            }
        }
        "substring" => {
            let start = args.first()?.as_int()? as usize;
            let end = if args.len() > 1 { args[1].as_int()? as usize } else { chars.len() };
            if start > end || end > chars.len() {
                return Some(Err(VmOutcome::Java(crate::except::new_exception(
                    "java/lang/StringIndexOutOfBoundsException",
                    Some(&format!("begin {}, end {}, length {}", start, end, chars.len())),
                ))));
            }
            let slice: String = chars[start..end].iter().collect();
            Some(Value::Ref(Some(ObjectHandle::string(slice))))
        }
        "indexOf" => {
            let idx = match args.first() {
                Some(Value::Int(c)) => chars.iter().position(|ch| *ch as i32 == *c),
                Some(other) => {
                    let needle = arg_string(other)?;
                    find_substring(&chars, &needle)
                }
                None => return None,
            };
            Some(Value::Int(idx.map(|i| i as i32).unwrap_or(-1)))
        }
        "contains" => {
            let needle = arg_string(args.first()?)?;
            Some(Value::from(text.contains(&needle)))
        }
        "startsWith" => {
            let needle = arg_string(args.first()?)?;
            Some(Value::from(text.starts_with(&needle)))
        }
        "endsWith" => {
            let needle = arg_string(args.first()?)?;
            Some(Value::from(text.ends_with(&needle)))
        }
        "equals" => {
            let equal = match args.first() {
                Some(Value::Ref(Some(other))) => other.as_host_string().as_deref() == Some(text.as_str()),
                _ => false,
            };
            Some(Value::from(equal))
        }
        "compareTo" => {
            let other = arg_string(args.first()?)?;
            Some(Value::Int(match text.cmp(&other) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }))
        }
        "toUpperCase" => Some(Value::Ref(Some(ObjectHandle::string(text.to_uppercase())))),
        "toLowerCase" => Some(Value::Ref(Some(ObjectHandle::string(text.to_lowercase())))),
        "trim" => Some(Value::Ref(Some(ObjectHandle::string(text.trim().to_string())))),
        "replace" => {
            let replaced = match (args.first()?, args.get(1)?) {
                (Value::Int(a), Value::Int(b)) => {
                    let (a, b) = (char::from_u32(*a as u32)?, char::from_u32(*b as u32)?);
                    text.replace(a, &b.to_string())
                }
                (a, b) => text.replace(&arg_string(a)?, &arg_string(b)?),
            };
            Some(Value::Ref(Some(ObjectHandle::string(replaced))))
        }
        "hashCode" => Some(Value::Int(java_string_hash(&text))),
        "toString" | "intern" => Some(Value::Ref(Some(receiver.clone()))),
        "toCharArray" => {
            let array = crate::heap::JavaArray {
                element_kind: crate::heap::ArrayElementKind::Char,
                element_type_name: None,
                elements: chars.iter().map(|c| Value::Int(*c as i32)).collect(),
            };
            Some(Value::Ref(Some(ObjectHandle::array(array))))
        }
        "getBytes" => {
            let array = crate::heap::JavaArray {
                element_kind: crate::heap::ArrayElementKind::Byte,
                element_type_name: None,
                elements: text.bytes().map(|b| Value::Int(b as i8 as i32)).collect(),
            };
            Some(Value::Ref(Some(ObjectHandle::array(array))))
        }
        _ => return None,
    };
    Some(Ok(result))
}

fn find_substring(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle.as_slice())
}

/// Java's `String.hashCode`: `s[0]*31^(n-1) + ... + s[n-1]`.
fn java_string_hash(s: &str) -> i32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    h
}

pub fn dispatch_static(class_name: &str, method_name: &str, args: &[Value]) -> Option<Result<Option<Value>, VmOutcome>> {
    if class_name != "java/lang/String" || method_name != "valueOf" {
        return None;
    }
    let text = java_value_to_display_string(args.first()?, None);
    Some(Ok(Some(Value::Ref(Some(ObjectHandle::string(text))))))
}

const BUILDER_CLASSES: &[&str] = &["java/lang/StringBuilder", "java/lang/StringBuffer"];

pub fn is_builder_class(class_name: &str) -> bool {
    BUILDER_CLASSES.contains(&class_name)
}

fn get_buffer(receiver: &ObjectHandle) -> String {
    receiver.with(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => match fields.get("_buffer") {
            Some(Value::Ref(Some(h))) => h.as_host_string().unwrap_or_default(),
            _ => String::new(),
        },
        _ => String::new(),
    })
}

fn set_buffer(receiver: &ObjectHandle, value: String) {
    receiver.with_mut(|obj| {
        if let Object::Instance(Instance { fields, .. }) = obj {
            fields.insert("_buffer".to_string(), Value::Ref(Some(ObjectHandle::string(value))));
        }
    });
}

pub fn dispatch_builder(
    receiver: &ObjectHandle,
    method_name: &str,
    descriptor: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    let result = match method_name {
        "<init>" => {
            let initial = match args.first() {
                Some(v) => java_value_to_display_string(v, None),
                None => String::new(),
            };
            set_buffer(receiver, initial);
            None
        }
        "append" => {
            let mut buffer = get_buffer(receiver);
            let as_char = first_param_is_char(descriptor);
            buffer.push_str(&java_value_to_display_string_as(args.first()?, None, as_char));
            set_buffer(receiver, buffer);
            Some(Value::Ref(Some(receiver.clone())))
        }
        "toString" => Some(Value::Ref(Some(ObjectHandle::string(get_buffer(receiver))))),
        "length" => Some(Value::Int(get_buffer(receiver).chars().count() as i32)),
        _ => return None,
    };
    Some(Ok(result))
}

/// Interprets a `StringConcatFactory.makeConcatWithConstants` recipe: `\x01` pulls the
/// next call-site argument, `\x02` pulls the next bootstrap constant, anything else is
/// emitted verbatim (§4.4, §9).
pub fn build_concat(recipe: &str, constants: &[String], args: Vec<Value>) -> String {
    let mut result = String::with_capacity(recipe.len());
    let mut args = args.into_iter();
    let mut constants = constants.iter();
    for ch in recipe.chars() {
        match ch {
            '\u{1}' => {
                if let Some(v) = args.next() {
                    result.push_str(&java_value_to_display_string(&v, None));
                }
            }
            '\u{2}' => {
                if let Some(c) = constants.next() {
                    result.push_str(c);
                }
            }
            other => result.push(other),
        }
    }
    result
}
