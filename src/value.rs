//! The tagged value cell used for every operand-stack slot, local variable, field, and
//! static. Category-2 values (`long`/`double`) are collapsed into a single slot (the
//! category-2 simplification, §3/§9): well-formed bytecode stays consistent under this
//! model because `lload_n`/`lstore_n` and friends are mapped per-opcode to one slot here.

use crate::heap::ObjectHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjectHandle>),
}

impl Value {
    pub fn null() -> Value {
        Value::Ref(None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(None))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Option<&Option<ObjectHandle>> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Ref(_) => "reference",
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i32)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Value::Ref(Some(v))
    }
}

impl From<Option<ObjectHandle>> for Value {
    fn from(v: Option<ObjectHandle>) -> Self {
        Value::Ref(v)
    }
}

/// A per-invocation frame: locals, operand stack, program counter, owning class.
/// Created at call, destroyed at return or exception unwind; no frame outlives the call.
pub struct Frame<'c> {
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    pub max_stack: usize,
    pub pc: u32,
    pub class_name: &'c str,
    pub constants: &'c crate::class::constant::ConstantPool,
    pub code: &'c [u8],
}

impl<'c> Frame<'c> {
    pub fn new(
        max_locals: u16,
        max_stack: u16,
        class_name: &'c str,
        constants: &'c crate::class::constant::ConstantPool,
        code: &'c [u8],
    ) -> Self {
        Frame {
            locals: vec![Value::null(); max_locals as usize],
            stack: Vec::with_capacity(max_stack as usize),
            max_stack: max_stack as usize,
            pc: 0,
            class_name,
            constants,
            code,
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), crate::error::VmError> {
        if self.stack.len() >= self.max_stack {
            return Err(crate::error::VmError::StackOverflow(self.stack.len()));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, crate::error::VmError> {
        self.stack.pop().ok_or(crate::error::VmError::StackUnderflow)
    }

    pub fn pop_ref(&mut self) -> Result<Option<ObjectHandle>, crate::error::VmError> {
        match self.pop()? {
            Value::Ref(handle) => Ok(handle),
            other => Err(crate::error::VmError::Format(format!("expected reference, found {}", other.kind()))),
        }
    }

    pub fn pop_int(&mut self) -> Result<i32, crate::error::VmError> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(crate::error::VmError::Format(format!("expected int, found {}", other.kind()))),
        }
    }
}
