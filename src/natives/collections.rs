//! `Collections.sort`/`ArrayList.sort` natives (§4.5): both reach into the list's
//! `elementData` array and `size` field directly rather than going through an
//! `Iterator`, and sort either by natural ordering or by invoking a `Comparator`
//! through the ordinary interface-dispatch path.

use crate::env::JavaEnv;
use crate::error::{VmError, VmOutcome};
use crate::heap::{Instance, Object, ObjectHandle};
use crate::invoke;
use crate::value::Value;

pub fn dispatch_static(
    env: &JavaEnv,
    class_name: &str,
    method_name: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    if class_name != "java/util/Collections" || method_name != "sort" {
        return None;
    }
    let list = match args.first() {
        Some(Value::Ref(Some(h))) => h.clone(),
        _ => return Some(Err(VmOutcome::Java(crate::except::null_pointer()))),
    };
    let comparator = match args.get(1) {
        Some(Value::Ref(Some(h))) => Some(h.clone()),
        _ => None,
    };
    Some(sort_list(env, &list, comparator))
}

pub fn dispatch_instance(
    env: &JavaEnv,
    receiver: &ObjectHandle,
    class_name: &str,
    method_name: &str,
    args: &[Value],
) -> Option<Result<Option<Value>, VmOutcome>> {
    if method_name != "sort" || !class_name.ends_with("ArrayList") {
        return None;
    }
    let comparator = match args.first() {
        Some(Value::Ref(Some(h))) => Some(h.clone()),
        _ => None,
    };
    Some(sort_list(env, receiver, comparator))
}

fn list_backing(list: &ObjectHandle) -> Result<(ObjectHandle, usize), VmOutcome> {
    list.with(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => {
            let array = match fields.get("elementData") {
                Some(Value::Ref(Some(h))) => h.clone(),
                _ => return None,
            };
            let size = match fields.get("size") {
                Some(Value::Int(n)) => *n as usize,
                _ => return None,
            };
            Some((array, size))
        }
        _ => None,
    })
    .ok_or_else(|| VmOutcome::Vm(VmError::Format("sort target is not a List-shaped object".into())))
}

fn sort_list(env: &JavaEnv, list: &ObjectHandle, comparator: Option<ObjectHandle>) -> Result<Option<Value>, VmOutcome> {
    let (array_handle, size) = list_backing(list)?;

    let mut elements: Vec<Value> =
        array_handle.with(|obj| match obj {
            Object::Array(a) => a.elements[..size.min(a.len())].to_vec(),
            _ => Vec::new(),
        });

    if let Some(cmp) = comparator {
        // Insertion sort: stable, and lets a comparator error abort cleanly mid-pass
        // without leaving partially-applied swaps from a recursive sort routine.
        for i in 1..elements.len() {
            let mut j = i;
            while j > 0 {
                let order = invoke::invoke_interface(
                    env,
                    "compare",
                    "(Ljava/lang/Object;Ljava/lang/Object;)I",
                    cmp.clone(),
                    vec![elements[j - 1], elements[j]],
                )?;
                match order {
                    Some(Value::Int(o)) if o > 0 => {
                        elements.swap(j - 1, j);
                        j -= 1;
                    }
                    _ => break,
                }
            }
        }
    } else {
        elements.sort_by(natural_compare);
    }

    array_handle.with_mut(|obj| {
        if let Object::Array(a) = obj {
            for (i, v) in elements.into_iter().enumerate() {
                a.elements[i] = v;
            }
        }
    });
    Ok(None)
}

fn boxed_value(handle: &ObjectHandle) -> Option<Value> {
    handle.with(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => fields.get("value").copied(),
        _ => None,
    })
}

fn natural_compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Ref(Some(ha)), Value::Ref(Some(hb))) => {
            if let (Some(sa), Some(sb)) = (ha.as_host_string(), hb.as_host_string()) {
                return sa.cmp(&sb);
            }
            match (boxed_value(ha), boxed_value(hb)) {
                (Some(va), Some(vb)) => numeric_compare(va, vb),
                _ => Ordering::Equal,
            }
        }
        _ => Ordering::Equal,
    }
}

fn numeric_compare(a: Value, b: Value) -> std::cmp::Ordering {
    let (a, b) = (as_f64(a), as_f64(b));
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
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
