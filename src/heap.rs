//! The heap object model (§3): user objects, reference/primitive arrays, and lambda
//! proxies synthesized by `invokedynamic`. There is no explicit destruction — objects
//! become eligible for reclamation by the host allocator once unreachable, matching the
//! "no JIT/GC" Non-goal: the host's `Rc` drop glue *is* the collector.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::rc::Rc;

use crate::value::Value;

/// Describes a functional-interface proxy created by `LambdaMetafactory.metafactory`
/// (§4.4, §9). Invoking `interface_name.method_name` on the owning object prepends
/// `captured_args` to the call arguments and dispatches to `target_class.target_method`.
#[derive(Debug, Clone)]
pub struct LambdaTarget {
    pub interface_name: String,
    pub method_name: String,
    pub target_class: String,
    pub target_method: String,
    pub target_descriptor: String,
    pub captured_args: Vec<Value>,
    pub is_static: bool,
}

#[derive(Debug)]
pub struct Instance {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
    pub lambda_target: Option<LambdaTarget>,
}

impl Instance {
    pub fn new(class_name: impl Into<String>) -> Self {
        Instance { class_name: class_name.into(), fields: HashMap::new(), lambda_target: None }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayElementKind {
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Reference,
}

#[derive(Debug)]
pub struct JavaArray {
    pub element_kind: ArrayElementKind,
    pub element_type_name: Option<String>,
    pub elements: Vec<Value>,
}

impl JavaArray {
    pub fn new(element_kind: ArrayElementKind, element_type_name: Option<String>, length: i32) -> Self {
        let zero = match element_kind {
            ArrayElementKind::Float => Value::Float(0.0),
            ArrayElementKind::Double => Value::Double(0.0),
            ArrayElementKind::Long => Value::Long(0),
            ArrayElementKind::Reference => Value::null(),
            _ => Value::Int(0),
        };
        JavaArray { element_kind, element_type_name, elements: vec![zero; length.max(0) as usize] }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// A heap object: either a user instance or an array. Host strings are modeled as a
/// distinct variant rather than an `Instance` of `java/lang/String` so that the
/// interpreter can divert to the native string-method handler without reimplementing
/// `String` in bytecode (§9, dynamic-dispatch receivers).
#[derive(Debug)]
pub enum Object {
    Instance(Instance),
    Array(JavaArray),
    StringObject(String),
}

/// A shared, mutable handle to a heap object. `Rc<Mutex<..>>` rather than the JNI-style
/// raw pointer a real VM might use: the interpreter is single-threaded (§5) so the mutex
/// is purely an interior-mutability device, not a synchronization primitive.
#[derive(Clone)]
pub struct ObjectHandle(Rc<Mutex<Object>>);

impl ObjectHandle {
    pub fn instance(class_name: impl Into<String>) -> Self {
        ObjectHandle(Rc::new(Mutex::new(Object::Instance(Instance::new(class_name)))))
    }

    pub fn array(array: JavaArray) -> Self {
        ObjectHandle(Rc::new(Mutex::new(Object::Array(array))))
    }

    pub fn string(value: impl Into<String>) -> Self {
        ObjectHandle(Rc::new(Mutex::new(Object::StringObject(value.into()))))
    }

    /// A `Class` mirror object as pushed by `ldc` on a class entry (§4.3): an instance
    /// of `java/lang/Class` carrying a `name` field, not a distinct reflective type.
    pub fn class_mirror(name: impl Into<String>) -> Self {
        let handle = ObjectHandle::instance("java/lang/Class");
        let name = name.into();
        handle.with_mut(|obj| {
            if let Object::Instance(Instance { fields, .. }) = obj {
                fields.insert("name".to_string(), Value::Ref(Some(ObjectHandle::string(name))));
            }
        });
        handle
    }

    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A host-pointer-derived identity hash, masked to 31 bits (§4.5).
    pub fn identity_hash(&self) -> i32 {
        let ptr = Rc::as_ptr(&self.0) as usize;
        (ptr as i32) & 0x7fff_ffff
    }

    pub fn with<R>(&self, f: impl FnOnce(&Object) -> R) -> R {
        let guard = self.0.lock();
        f(&guard)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Object) -> R) -> R {
        let mut guard = self.0.lock();
        f(&mut guard)
    }

    pub fn class_name(&self) -> String {
        self.with(|obj| match obj {
            Object::Instance(i) => i.class_name.clone(),
            Object::Array(a) => array_class_name(a),
            Object::StringObject(_) => "java/lang/String".to_string(),
        })
    }

    pub fn as_host_string(&self) -> Option<String> {
        self.with(|obj| match obj {
            Object::StringObject(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn is_array(&self) -> bool {
        self.with(|obj| matches!(obj, Object::Array(_)))
    }

    pub fn array_len(&self) -> Option<usize> {
        self.with(|obj| match obj {
            Object::Array(a) => Some(a.len()),
            _ => None,
        })
    }
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHandle({})", self.class_name())
    }
}

pub fn array_class_name(array: &JavaArray) -> String {
    let inner = match array.element_kind {
        ArrayElementKind::Byte => "B".to_string(),
        ArrayElementKind::Char => "C".to_string(),
        ArrayElementKind::Short => "S".to_string(),
        ArrayElementKind::Int => "I".to_string(),
        ArrayElementKind::Long => "J".to_string(),
        ArrayElementKind::Float => "F".to_string(),
        ArrayElementKind::Double => "D".to_string(),
        ArrayElementKind::Boolean => "Z".to_string(),
        ArrayElementKind::Reference => match array.element_type_name.as_deref() {
            Some(name) if name.starts_with('[') => name.to_string(),
            Some(name) => format!("L{};", name),
            None => "Ljava/lang/Object;".to_string(),
        },
    };
    format!("[{}", inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reference_array_defaults_to_null() {
        let array = JavaArray::new(ArrayElementKind::Reference, None, 3);
        assert_eq!(array.len(), 3);
        assert!(array.elements.iter().all(Value::is_null));
    }

    #[test]
    fn distinct_objects_are_not_ptr_eq() {
        let a = ObjectHandle::instance("java/lang/Object");
        let b = ObjectHandle::instance("java/lang/Object");
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
        assert!(a.identity_hash() >= 0);
    }
}
