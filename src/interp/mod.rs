//! The bytecode interpreter loop (§4.3): one iteration per instruction, operating on a
//! single `Frame` until a `return` opcode, an uncaught exception, or a host error ends
//! it. Opcode bytes follow the standard JVM instruction set; category-2 values
//! (`long`/`double`) occupy a single stack/local slot under the category-2
//! simplification (§3/§9), so e.g. `lload`/`dstore` behave exactly like their
//! category-1 counterparts here.

use log::trace;

use crate::class::constant::Constant;
use crate::class::descriptor::{arg_slot_count, returns_void, FieldDescriptor};
use crate::class::attribute::Code;
use crate::env::JavaEnv;
use crate::error::{VmError, VmOutcome, VmResult};
use crate::except;
use crate::heap::{ArrayElementKind, Object, ObjectHandle};
use crate::invoke;
use crate::loader::ClassRef;
use crate::value::{Frame, Value};

enum Step {
    Continue,
    Return(Option<Value>),
}

fn io_vm(e: std::io::Error) -> VmOutcome {
    VmOutcome::Vm(VmError::Io(e))
}

fn read_u8(frame: &mut Frame) -> u8 {
    let b = frame.code[frame.pc as usize];
    frame.pc += 1;
    b
}

fn read_i8(frame: &mut Frame) -> i8 {
    read_u8(frame) as i8
}

fn read_u16(frame: &mut Frame) -> u16 {
    let hi = read_u8(frame) as u16;
    let lo = read_u8(frame) as u16;
    (hi << 8) | lo
}

fn read_i16(frame: &mut Frame) -> i16 {
    read_u16(frame) as i16
}

fn read_i32(frame: &mut Frame) -> i32 {
    let mut v = 0i32;
    for _ in 0..4 {
        v = (v << 8) | read_u8(frame) as i32;
    }
    v
}

/// Under the single-slot `long`/`double` model (value.rs, §3/§9), a category-2 value
/// occupies exactly one stack slot the same as any other — so `dup2`/`dup2_x1`/
/// `dup2_x2`/`pop2`'s category-2 forms (emitted by `javac` as if such a value still
/// took two slots) must collapse to operate on that single slot rather than two.
fn is_category2(value: &Value) -> bool {
    matches!(value, Value::Long(_) | Value::Double(_))
}

fn pop_args(frame: &mut Frame, count: usize) -> VmResult<Vec<Value>> {
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        args.push(frame.pop().map_err(VmOutcome::Vm)?);
    }
    args.reverse();
    Ok(args)
}

fn array_element_kind(array: &ObjectHandle) -> Option<ArrayElementKind> {
    array.with(|obj| match obj {
        Object::Array(a) => Some(a.element_kind),
        _ => None,
    })
}

fn array_load(frame: &mut Frame, expect: &[ArrayElementKind]) -> VmResult<()> {
    let index = frame.pop_int().map_err(VmOutcome::Vm)?;
    let array = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
    if !expect.is_empty() {
        if let Some(kind) = array_element_kind(&array) {
            if !expect.contains(&kind) {
                return Err(VmOutcome::Vm(VmError::Format(format!("array load kind mismatch: expected {:?}, found {:?}", expect, kind))));
            }
        }
    }
    let value = array.with(|obj| match obj {
        Object::Array(a) => {
            if index < 0 || index as usize >= a.len() {
                Err(VmOutcome::Java(except::array_index_oob(index, a.len())))
            } else {
                Ok(a.elements[index as usize])
            }
        }
        _ => Err(VmOutcome::Vm(VmError::Format("array load on a non-array object".into()))),
    })?;
    frame.push(value).map_err(VmOutcome::Vm)
}

fn array_store(frame: &mut Frame, value: Value) -> VmResult<()> {
    let index = frame.pop_int().map_err(VmOutcome::Vm)?;
    let array = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
    array.with_mut(|obj| match obj {
        Object::Array(a) => {
            if index < 0 || index as usize >= a.len() {
                Err(VmOutcome::Java(except::array_index_oob(index, a.len())))
            } else {
                a.elements[index as usize] = value;
                Ok(())
            }
        }
        _ => Err(VmOutcome::Vm(VmError::Format("array store on a non-array object".into()))),
    })
}

fn class_name_at(frame: &Frame, index: u16) -> VmResult<String> {
    frame.constants.class_name(index).map(str::to_string).map_err(io_vm)
}

fn field_ref_at(frame: &Frame, index: u16) -> VmResult<(String, String, FieldDescriptor)> {
    let (class, name, descriptor) = frame.constants.resolve_ref(index).map_err(io_vm)?;
    let parsed = FieldDescriptor::parse(descriptor).map_err(io_vm)?;
    Ok((class.to_string(), name.to_string(), parsed))
}

fn method_ref_at(frame: &Frame, index: u16) -> VmResult<(String, String, String)> {
    let (class, name, descriptor) = frame.constants.resolve_ref(index).map_err(io_vm)?;
    Ok((class.to_string(), name.to_string(), descriptor.to_string()))
}

/// Recursively allocates the first `dims` dimensions of a `multianewarray` (§4.3);
/// every level but the innermost holds `Reference`-kind arrays of sub-arrays.
fn build_multi_array(element_descriptor: &FieldDescriptor, counts: &[i32]) -> VmResult<ObjectHandle> {
    let count = counts[0];
    if counts.len() == 1 {
        let (kind, type_name) = leaf_kind(element_descriptor);
        return invoke::new_array(kind, type_name, count);
    }
    let array = invoke::new_array(ArrayElementKind::Reference, Some(sub_array_type_name(element_descriptor, counts.len() - 1)), count)?;
    if count > 0 {
        let mut elements = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let sub = build_multi_array(element_descriptor, &counts[1..])?;
            elements.push(Value::Ref(Some(sub)));
        }
        array.with_mut(|obj| {
            if let Object::Array(a) = obj {
                a.elements = elements;
            }
        });
    }
    Ok(array)
}

fn leaf_kind(descriptor: &FieldDescriptor) -> (ArrayElementKind, Option<String>) {
    match descriptor {
        FieldDescriptor::Byte => (ArrayElementKind::Byte, None),
        FieldDescriptor::Char => (ArrayElementKind::Char, None),
        FieldDescriptor::Short => (ArrayElementKind::Short, None),
        FieldDescriptor::Int => (ArrayElementKind::Int, None),
        FieldDescriptor::Long => (ArrayElementKind::Long, None),
        FieldDescriptor::Float => (ArrayElementKind::Float, None),
        FieldDescriptor::Double => (ArrayElementKind::Double, None),
        FieldDescriptor::Boolean => (ArrayElementKind::Boolean, None),
        FieldDescriptor::Object(name) => (ArrayElementKind::Reference, Some(name.clone())),
        FieldDescriptor::Array(inner) => (ArrayElementKind::Reference, Some(format!("{}", inner))),
        _ => (ArrayElementKind::Reference, None),
    }
}

/// Builds the descriptor of the array type found `remaining_dims` levels below the one
/// being allocated — e.g. for `int[][]`'s outer level, `remaining_dims == 1` and this
/// returns `"[I"`, the descriptor of each `int[]` element.
fn sub_array_type_name(element_descriptor: &FieldDescriptor, remaining_dims: usize) -> String {
    let mut text = String::new();
    for _ in 0..remaining_dims {
        text.push('[');
    }
    text.push_str(&element_descriptor.to_string());
    text
}

/// Runs `frame` to completion: `Ok(v)` on a `return`, `Err(VmOutcome::Java(_))` for an
/// exception that escaped every handler in `code.exception_table`, `Err(VmOutcome::Vm(_))`
/// for a host-level abort.
pub fn run(env: &JavaEnv, class: &ClassRef, frame: &mut Frame, code: &Code) -> VmResult<Option<Value>> {
    loop {
        let start_pc = frame.pc;
        match step(env, class, frame) {
            Ok(Step::Continue) => continue,
            Ok(Step::Return(v)) => return Ok(v),
            Err(VmOutcome::Vm(e)) => return Err(VmOutcome::Vm(e)),
            Err(VmOutcome::Java(exception)) => {
                let exception_class = exception.class_name();
                let handler = code.exception_table.iter().find(|bound| {
                    bound.covers(start_pc as u16)
                        && (bound.catch_type == 0
                            || frame
                                .constants
                                .class_name(bound.catch_type)
                                .map(|target| invoke::is_assignable(env, &exception_class, target))
                                .unwrap_or(false))
                });
                match handler {
                    Some(bound) => {
                        frame.stack.clear();
                        frame.push(Value::Ref(Some(exception))).map_err(VmOutcome::Vm)?;
                        frame.pc = bound.handler_pc as u32;
                    }
                    None => return Err(VmOutcome::Java(exception)),
                }
            }
        }
    }
}

fn step(env: &JavaEnv, class: &ClassRef, frame: &mut Frame) -> VmResult<Step> {
    let opcode = read_u8(frame);
    trace!("{}@{} op=0x{:02x}", frame.class_name, frame.pc - 1, opcode);

    match opcode {
        0x00 => {} // nop
        0x01 => frame.push(Value::null()).map_err(VmOutcome::Vm)?, // aconst_null
        0x02..=0x08 => frame.push(Value::Int(opcode as i32 - 0x03)).map_err(VmOutcome::Vm)?, // iconst_m1..iconst_5
        0x09 | 0x0a => frame.push(Value::Long(opcode as i64 - 0x09)).map_err(VmOutcome::Vm)?, // lconst_0/1
        0x0b..=0x0d => frame.push(Value::Float(opcode as f32 - 0x0b as f32)).map_err(VmOutcome::Vm)?, // fconst_0/1/2
        0x0e | 0x0f => frame.push(Value::Double(opcode as f64 - 0x0e as f64)).map_err(VmOutcome::Vm)?, // dconst_0/1
        0x10 => frame.push(Value::Int(read_i8(frame) as i32)).map_err(VmOutcome::Vm)?, // bipush
        0x11 => frame.push(Value::Int(read_i16(frame) as i32)).map_err(VmOutcome::Vm)?, // sipush
        0x12 | 0x13 => {
            // ldc / ldc_w
            let index = if opcode == 0x12 { read_u8(frame) as u16 } else { read_u16(frame) };
            let value = load_constant(frame, index)?;
            frame.push(value).map_err(VmOutcome::Vm)?;
        }
        0x14 => {
            // ldc2_w
            let index = read_u16(frame);
            let value = match frame.constants.get(index).map_err(io_vm)? {
                Constant::Long(v) => Value::Long(*v),
                Constant::Double(v) => Value::Double(*v),
                other => return Err(VmOutcome::Vm(VmError::Format(format!("ldc2_w on non-wide constant {:?}", other)))),
            };
            frame.push(value).map_err(VmOutcome::Vm)?;
        }
        0x15..=0x19 => {
            // iload/lload/fload/dload/aload
            let idx = read_u8(frame) as usize;
            frame.push(frame.locals[idx]).map_err(VmOutcome::Vm)?;
        }
        0x1a..=0x1d => frame.push(frame.locals[(opcode - 0x1a) as usize]).map_err(VmOutcome::Vm)?, // iload_0..3
        0x1e..=0x21 => frame.push(frame.locals[(opcode - 0x1e) as usize]).map_err(VmOutcome::Vm)?, // lload_0..3
        0x22..=0x25 => frame.push(frame.locals[(opcode - 0x22) as usize]).map_err(VmOutcome::Vm)?, // fload_0..3
        0x26..=0x29 => frame.push(frame.locals[(opcode - 0x26) as usize]).map_err(VmOutcome::Vm)?, // dload_0..3
        0x2a..=0x2d => frame.push(frame.locals[(opcode - 0x2a) as usize]).map_err(VmOutcome::Vm)?, // aload_0..3
        0x2e => array_load(frame, &[ArrayElementKind::Int])?,    // iaload
        0x2f => array_load(frame, &[ArrayElementKind::Long])?,   // laload
        0x30 => array_load(frame, &[ArrayElementKind::Float])?,  // faload
        0x31 => array_load(frame, &[ArrayElementKind::Double])?, // daload
        0x32 => array_load(frame, &[ArrayElementKind::Reference])?, // aaload
        0x33 => array_load(frame, &[ArrayElementKind::Byte, ArrayElementKind::Boolean])?, // baload
        0x34 => array_load(frame, &[ArrayElementKind::Char])?,  // caload
        0x35 => array_load(frame, &[ArrayElementKind::Short])?, // saload
        0x36..=0x3a => {
            // istore/lstore/fstore/dstore/astore
            let idx = read_u8(frame) as usize;
            let value = frame.pop().map_err(VmOutcome::Vm)?;
            frame.locals[idx] = value;
        }
        0x3b..=0x3e => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[(opcode - 0x3b) as usize] = v; } // istore_0..3
        0x3f..=0x42 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[(opcode - 0x3f) as usize] = v; } // lstore_0..3
        0x43..=0x46 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[(opcode - 0x43) as usize] = v; } // fstore_0..3
        0x47..=0x4a => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[(opcode - 0x47) as usize] = v; } // dstore_0..3
        0x4b..=0x4e => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[(opcode - 0x4b) as usize] = v; } // astore_0..3
        0x4f => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // iastore
        0x50 => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // lastore
        0x51 => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // fastore
        0x52 => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // dastore
        0x53 => {
            // aastore
            let value = frame.pop().map_err(VmOutcome::Vm)?;
            let index = frame.pop_int().map_err(VmOutcome::Vm)?;
            let array = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            if let (Value::Ref(Some(stored)), Some(elem_name)) = (
                value,
                array.with(|obj| match obj {
                    Object::Array(a) => a.element_type_name.clone(),
                    _ => None,
                }),
            ) {
                if !invoke::is_assignable(env, &stored.class_name(), &elem_name) {
                    return Err(VmOutcome::Java(except::array_store(&format!(
                        "{} cannot be stored in {}[]",
                        stored.class_name(),
                        elem_name
                    ))));
                }
            }
            array.with_mut(|obj| match obj {
                Object::Array(a) => {
                    if index < 0 || index as usize >= a.len() {
                        Err(VmOutcome::Java(except::array_index_oob(index, a.len())))
                    } else {
                        a.elements[index as usize] = value;
                        Ok(())
                    }
                }
                _ => Err(VmOutcome::Vm(VmError::Format("aastore on a non-array object".into()))),
            })?;
        }
        0x54 | 0x55 => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // bastore/castore
        0x56 => { let v = frame.pop().map_err(VmOutcome::Vm)?; array_store(frame, v)?; } // sastore
        0x57 => { frame.pop().map_err(VmOutcome::Vm)?; } // pop
        0x58 => {
            // pop2
            let top = frame.pop().map_err(VmOutcome::Vm)?;
            if !is_category2(&top) {
                frame.pop().map_err(VmOutcome::Vm)?;
            }
        }
        0x59 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.push(v).map_err(VmOutcome::Vm)?; frame.push(v).map_err(VmOutcome::Vm)?; } // dup
        0x5a => {
            // dup_x1
            let top = frame.pop().map_err(VmOutcome::Vm)?;
            let below = frame.pop().map_err(VmOutcome::Vm)?;
            frame.push(top).map_err(VmOutcome::Vm)?;
            frame.push(below).map_err(VmOutcome::Vm)?;
            frame.push(top).map_err(VmOutcome::Vm)?;
        }
        0x5b => {
            // dup_x2
            let a = frame.pop().map_err(VmOutcome::Vm)?;
            let b = frame.pop().map_err(VmOutcome::Vm)?;
            let c = frame.pop().map_err(VmOutcome::Vm)?;
            frame.push(a).map_err(VmOutcome::Vm)?;
            frame.push(c).map_err(VmOutcome::Vm)?;
            frame.push(b).map_err(VmOutcome::Vm)?;
            frame.push(a).map_err(VmOutcome::Vm)?;
        }
        0x5c => {
            // dup2
            let a = frame.pop().map_err(VmOutcome::Vm)?;
            if is_category2(&a) {
                frame.push(a).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
            } else {
                let b = frame.pop().map_err(VmOutcome::Vm)?;
                frame.push(b).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
                frame.push(b).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
            }
        }
        0x5d => {
            // dup2_x1
            let a = frame.pop().map_err(VmOutcome::Vm)?;
            if is_category2(&a) {
                let b = frame.pop().map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
                frame.push(b).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
            } else {
                let b = frame.pop().map_err(VmOutcome::Vm)?;
                let c = frame.pop().map_err(VmOutcome::Vm)?;
                frame.push(b).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
                frame.push(c).map_err(VmOutcome::Vm)?;
                frame.push(b).map_err(VmOutcome::Vm)?;
                frame.push(a).map_err(VmOutcome::Vm)?;
            }
        }
        0x5e => {
            // dup2_x2
            let a = frame.pop().map_err(VmOutcome::Vm)?;
            if is_category2(&a) {
                let b = frame.pop().map_err(VmOutcome::Vm)?;
                if is_category2(&b) {
                    frame.push(a).map_err(VmOutcome::Vm)?;
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                } else {
                    let c = frame.pop().map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                    frame.push(c).map_err(VmOutcome::Vm)?;
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                }
            } else {
                let b = frame.pop().map_err(VmOutcome::Vm)?;
                let c = frame.pop().map_err(VmOutcome::Vm)?;
                if is_category2(&c) {
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                    frame.push(c).map_err(VmOutcome::Vm)?;
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                } else {
                    let d = frame.pop().map_err(VmOutcome::Vm)?;
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                    frame.push(d).map_err(VmOutcome::Vm)?;
                    frame.push(c).map_err(VmOutcome::Vm)?;
                    frame.push(b).map_err(VmOutcome::Vm)?;
                    frame.push(a).map_err(VmOutcome::Vm)?;
                }
            }
        }
        0x5f => {
            // swap
            let a = frame.pop().map_err(VmOutcome::Vm)?;
            let b = frame.pop().map_err(VmOutcome::Vm)?;
            frame.push(a).map_err(VmOutcome::Vm)?;
            frame.push(b).map_err(VmOutcome::Vm)?;
        }
        0x60 => binary_int(frame, i32::wrapping_add)?,  // iadd
        0x61 => binary_long(frame, i64::wrapping_add)?, // ladd
        0x62 => binary_float(frame, |a, b| a + b)?,     // fadd
        0x63 => binary_double(frame, |a, b| a + b)?,    // dadd
        0x64 => binary_int(frame, i32::wrapping_sub)?,  // isub
        0x65 => binary_long(frame, i64::wrapping_sub)?, // lsub
        0x66 => binary_float(frame, |a, b| a - b)?,     // fsub
        0x67 => binary_double(frame, |a, b| a - b)?,    // dsub
        0x68 => binary_int(frame, i32::wrapping_mul)?,  // imul
        0x69 => binary_long(frame, i64::wrapping_mul)?, // lmul
        0x6a => binary_float(frame, |a, b| a * b)?,     // fmul
        0x6b => binary_double(frame, |a, b| a * b)?,    // dmul
        0x6c => checked_int_div(frame, false)?,  // idiv
        0x6d => checked_long_div(frame, false)?, // ldiv
        0x6e => binary_float(frame, |a, b| a / b)?,  // fdiv
        0x6f => binary_double(frame, |a, b| a / b)?, // ddiv
        0x70 => checked_int_div(frame, true)?,  // irem
        0x71 => checked_long_div(frame, true)?, // lrem
        0x72 => binary_float(frame, |a, b| a % b)?,  // frem
        0x73 => binary_double(frame, |a, b| a % b)?, // drem
        0x74 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Int(v.wrapping_neg())).map_err(VmOutcome::Vm)?; } // ineg
        0x75 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.push(Value::Long(v.as_long().unwrap_or(0).wrapping_neg())).map_err(VmOutcome::Vm)?; } // lneg
        0x76 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.push(Value::Float(-v.as_float().unwrap_or(0.0))).map_err(VmOutcome::Vm)?; } // fneg
        0x77 => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.push(Value::Double(-v.as_double().unwrap_or(0.0))).map_err(VmOutcome::Vm)?; } // dneg
        0x78 => binary_int(frame, |a, b| a.wrapping_shl(b as u32 & 31))?, // ishl
        0x79 => { let b = frame.pop_int().map_err(VmOutcome::Vm)?; let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Long(a.wrapping_shl(b as u32 & 63))).map_err(VmOutcome::Vm)?; } // lshl
        0x7a => binary_int(frame, |a, b| a.wrapping_shr(b as u32 & 31))?, // ishr
        0x7b => { let b = frame.pop_int().map_err(VmOutcome::Vm)?; let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Long(a.wrapping_shr(b as u32 & 63))).map_err(VmOutcome::Vm)?; } // lshr
        0x7c => { let b = frame.pop_int().map_err(VmOutcome::Vm)?; let a = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Int(((a as u32).wrapping_shr(b as u32 & 31)) as i32)).map_err(VmOutcome::Vm)?; } // iushr
        0x7d => { let b = frame.pop_int().map_err(VmOutcome::Vm)?; let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Long(((a as u64).wrapping_shr(b as u32 & 63)) as i64)).map_err(VmOutcome::Vm)?; } // lushr
        0x7e => binary_int(frame, |a, b| a & b)?,  // iand
        0x7f => binary_long(frame, |a, b| a & b)?, // land
        0x80 => binary_int(frame, |a, b| a | b)?,  // ior
        0x81 => binary_long(frame, |a, b| a | b)?, // lor
        0x82 => binary_int(frame, |a, b| a ^ b)?,  // ixor
        0x83 => binary_long(frame, |a, b| a ^ b)?, // lxor
        0x84 => {
            // iinc
            let idx = read_u8(frame) as usize;
            let delta = read_i8(frame) as i32;
            let current = frame.locals[idx].as_int().unwrap_or(0);
            frame.locals[idx] = Value::Int(current.wrapping_add(delta));
        }
        0x85 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Long(v as i64)).map_err(VmOutcome::Vm)?; } // i2l
        0x86 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Float(v as f32)).map_err(VmOutcome::Vm)?; } // i2f
        0x87 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Double(v as f64)).map_err(VmOutcome::Vm)?; } // i2d
        0x88 => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Int(v as i32)).map_err(VmOutcome::Vm)?; } // l2i
        0x89 => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Float(v as f32)).map_err(VmOutcome::Vm)?; } // l2f
        0x8a => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Double(v as f64)).map_err(VmOutcome::Vm)?; } // l2d
        0x8b => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0); frame.push(Value::Int(v as i32)).map_err(VmOutcome::Vm)?; } // f2i
        0x8c => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0); frame.push(Value::Long(v as i64)).map_err(VmOutcome::Vm)?; } // f2l
        0x8d => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0); frame.push(Value::Double(v as f64)).map_err(VmOutcome::Vm)?; } // f2d
        0x8e => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0); frame.push(Value::Int(v as i32)).map_err(VmOutcome::Vm)?; } // d2i
        0x8f => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0); frame.push(Value::Long(v as i64)).map_err(VmOutcome::Vm)?; } // d2l
        0x90 => { let v = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0); frame.push(Value::Float(v as f32)).map_err(VmOutcome::Vm)?; } // d2f
        0x91 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Int(v as i8 as i32)).map_err(VmOutcome::Vm)?; } // i2b
        0x92 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Int(v as u16 as i32)).map_err(VmOutcome::Vm)?; } // i2c
        0x93 => { let v = frame.pop_int().map_err(VmOutcome::Vm)?; frame.push(Value::Int(v as i16 as i32)).map_err(VmOutcome::Vm)?; } // i2s
        0x94 => { let b = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0); frame.push(Value::Int(a.cmp(&b) as i32)).map_err(VmOutcome::Vm)?; } // lcmp
        0x95 => fcmp(frame, false)?, // fcmpl
        0x96 => fcmp(frame, true)?,  // fcmpg
        0x97 => dcmp(frame, false)?, // dcmpl
        0x98 => dcmp(frame, true)?,  // dcmpg
        0x99..=0x9e => branch_if_int(frame, opcode)?,      // ifeq..ifle
        0x9f..=0xa4 => branch_if_icmp(frame, opcode)?,     // if_icmpeq..if_icmple
        0xa5 | 0xa6 => branch_if_acmp(frame, opcode)?,     // if_acmpeq/ne
        0xa7 => { let offset = read_i16(frame) as i32; frame.pc = (frame.pc as i32 - 3 + offset) as u32; } // goto
        0xa8 | 0xa9 => return Err(VmOutcome::Vm(VmError::Format("jsr/ret are not supported".into()))), // jsr/ret
        0xaa => return table_switch(frame), // tableswitch
        0xab => return lookup_switch(frame), // lookupswitch
        0xac => return Ok(Step::Return(Some(frame.pop().map_err(VmOutcome::Vm)?))), // ireturn
        0xad => return Ok(Step::Return(Some(frame.pop().map_err(VmOutcome::Vm)?))), // lreturn
        0xae => return Ok(Step::Return(Some(frame.pop().map_err(VmOutcome::Vm)?))), // freturn
        0xaf => return Ok(Step::Return(Some(frame.pop().map_err(VmOutcome::Vm)?))), // dreturn
        0xb0 => return Ok(Step::Return(Some(frame.pop().map_err(VmOutcome::Vm)?))), // areturn
        0xb1 => return Ok(Step::Return(None)), // return
        0xb2 => {
            // getstatic
            let index = read_u16(frame);
            let (class_name, field_name, descriptor) = field_ref_at(frame, index)?;
            let value = invoke::get_static(env, &class_name, &field_name, &descriptor)?;
            frame.push(value).map_err(VmOutcome::Vm)?;
        }
        0xb3 => {
            // putstatic
            let index = read_u16(frame);
            let (class_name, field_name, _) = field_ref_at(frame, index)?;
            let value = frame.pop().map_err(VmOutcome::Vm)?;
            invoke::put_static(env, &class_name, &field_name, value)?;
        }
        0xb4 => {
            // getfield
            let index = read_u16(frame);
            let (_, field_name, descriptor) = field_ref_at(frame, index)?;
            let receiver = frame.pop_ref().map_err(VmOutcome::Vm)?;
            let value = invoke::get_field(receiver.as_ref(), &field_name, &descriptor)?;
            frame.push(value).map_err(VmOutcome::Vm)?;
        }
        0xb5 => {
            // putfield
            let index = read_u16(frame);
            let (_, field_name, _) = field_ref_at(frame, index)?;
            let value = frame.pop().map_err(VmOutcome::Vm)?;
            let receiver = frame.pop_ref().map_err(VmOutcome::Vm)?;
            invoke::put_field(receiver.as_ref(), &field_name, value)?;
        }
        0xb6 => {
            // invokevirtual
            let index = read_u16(frame);
            let (_, name, descriptor) = method_ref_at(frame, index)?;
            let desc = FieldDescriptor::parse_method(&descriptor).map_err(io_vm)?;
            let args = pop_args(frame, arg_slot_count(&desc))?;
            let receiver = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            let result = invoke::invoke_virtual(env, &name, &descriptor, receiver, args)?;
            push_if_nonvoid(frame, &desc, result)?;
        }
        0xb7 => {
            // invokespecial
            let index = read_u16(frame);
            let (class_name, name, descriptor) = method_ref_at(frame, index)?;
            let desc = FieldDescriptor::parse_method(&descriptor).map_err(io_vm)?;
            let args = pop_args(frame, arg_slot_count(&desc))?;
            let receiver = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            let result = invoke::invoke_special(env, &class_name, &name, &descriptor, receiver, args)?;
            push_if_nonvoid(frame, &desc, result)?;
        }
        0xb8 => {
            // invokestatic
            let index = read_u16(frame);
            let (class_name, name, descriptor) = method_ref_at(frame, index)?;
            let desc = FieldDescriptor::parse_method(&descriptor).map_err(io_vm)?;
            let args = pop_args(frame, arg_slot_count(&desc))?;
            let result = invoke::invoke_static(env, &class_name, &name, &descriptor, args)?;
            push_if_nonvoid(frame, &desc, result)?;
        }
        0xb9 => {
            // invokeinterface
            let index = read_u16(frame);
            let _count = read_u8(frame);
            let _zero = read_u8(frame);
            let (_, name, descriptor) = method_ref_at(frame, index)?;
            let desc = FieldDescriptor::parse_method(&descriptor).map_err(io_vm)?;
            let args = pop_args(frame, arg_slot_count(&desc))?;
            let receiver = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            let result = invoke::invoke_interface(env, &name, &descriptor, receiver, args)?;
            push_if_nonvoid(frame, &desc, result)?;
        }
        0xba => {
            // invokedynamic
            let index = read_u16(frame);
            let _zero = read_u16(frame);
            let (_, descriptor) = frame.constants.name_and_type(
                match frame.constants.get(index).map_err(io_vm)? {
                    Constant::InvokeDynamic { name_and_type_index, .. } => *name_and_type_index,
                    other => return Err(VmOutcome::Vm(VmError::Format(format!("invokedynamic on non-dynamic constant {:?}", other)))),
                },
            ).map_err(io_vm)?;
            let desc = FieldDescriptor::parse_method(descriptor).map_err(io_vm)?;
            let args = pop_args(frame, arg_slot_count(&desc))?;
            let result = invoke::invoke_dynamic(env, class, index, args)?;
            push_if_nonvoid(frame, &desc, result)?;
        }
        0xbb => {
            // new
            let index = read_u16(frame);
            let name = class_name_at(frame, index)?;
            let handle = invoke::new_instance(env, &name)?;
            frame.push(Value::Ref(Some(handle))).map_err(VmOutcome::Vm)?;
        }
        0xbc => {
            // newarray
            let atype = read_u8(frame);
            let count = frame.pop_int().map_err(VmOutcome::Vm)?;
            let kind = match atype {
                4 => ArrayElementKind::Boolean,
                5 => ArrayElementKind::Char,
                6 => ArrayElementKind::Float,
                7 => ArrayElementKind::Double,
                8 => ArrayElementKind::Byte,
                9 => ArrayElementKind::Short,
                10 => ArrayElementKind::Int,
                11 => ArrayElementKind::Long,
                other => return Err(VmOutcome::Vm(VmError::Format(format!("invalid newarray atype {}", other)))),
            };
            let handle = invoke::new_array(kind, None, count)?;
            frame.push(Value::Ref(Some(handle))).map_err(VmOutcome::Vm)?;
        }
        0xbd => {
            // anewarray
            let index = read_u16(frame);
            let name = class_name_at(frame, index)?;
            let count = frame.pop_int().map_err(VmOutcome::Vm)?;
            let handle = invoke::new_array(ArrayElementKind::Reference, Some(name), count)?;
            frame.push(Value::Ref(Some(handle))).map_err(VmOutcome::Vm)?;
        }
        0xbe => {
            // arraylength
            let array = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            let len = array.array_len().ok_or_else(|| VmOutcome::Vm(VmError::Format("arraylength on a non-array object".into())))?;
            frame.push(Value::Int(len as i32)).map_err(VmOutcome::Vm)?;
        }
        0xbf => {
            // athrow
            let exception = frame.pop_ref().map_err(VmOutcome::Vm)?.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
            return Err(VmOutcome::Java(exception));
        }
        0xc0 => {
            // checkcast
            let index = read_u16(frame);
            let target = class_name_at(frame, index)?;
            let top = *frame.stack.last().ok_or(VmError::StackUnderflow).map_err(VmOutcome::Vm)?;
            if let Value::Ref(Some(handle)) = top {
                if !invoke::is_assignable(env, &handle.class_name(), &target) {
                    return Err(VmOutcome::Java(except::class_cast(&handle.class_name(), &target)));
                }
            }
        }
        0xc1 => {
            // instanceof
            let index = read_u16(frame);
            let target = class_name_at(frame, index)?;
            let value = frame.pop_ref().map_err(VmOutcome::Vm)?;
            let result = match value {
                Some(handle) => invoke::is_assignable(env, &handle.class_name(), &target),
                None => false,
            };
            frame.push(Value::from(result)).map_err(VmOutcome::Vm)?;
        }
        0xc2 | 0xc3 => { frame.pop_ref().map_err(VmOutcome::Vm)?; } // monitorenter/exit (no-op, single-threaded)
        0xc4 => return wide(frame), // wide
        0xc5 => {
            // multianewarray
            let index = read_u16(frame);
            let dims = read_u8(frame) as usize;
            let descriptor_text = class_name_at(frame, index)?;
            let descriptor = FieldDescriptor::parse(&descriptor_text).map_err(io_vm)?;
            let mut counts = pop_args(frame, dims)?.into_iter().map(|v| v.as_int().unwrap_or(0)).collect::<Vec<_>>();
            if counts.iter().any(|&c| c < 0) {
                return Err(VmOutcome::Java(except::negative_array_size(*counts.iter().find(|&&c| c < 0).unwrap())));
            }
            let mut element = &descriptor;
            for _ in 0..dims {
                if let FieldDescriptor::Array(inner) = element {
                    element = inner;
                }
            }
            let handle = build_multi_array(element, &counts)?;
            counts.clear();
            frame.push(Value::Ref(Some(handle))).map_err(VmOutcome::Vm)?;
        }
        0xc6 => {
            // ifnull
            let offset = read_i16(frame) as i32;
            let value = frame.pop_ref().map_err(VmOutcome::Vm)?;
            if value.is_none() {
                frame.pc = (frame.pc as i32 - 3 + offset) as u32;
            }
        }
        0xc7 => {
            // ifnonnull
            let offset = read_i16(frame) as i32;
            let value = frame.pop_ref().map_err(VmOutcome::Vm)?;
            if value.is_some() {
                frame.pc = (frame.pc as i32 - 3 + offset) as u32;
            }
        }
        0xc8 => { let offset = read_i32(frame); frame.pc = (frame.pc as i32 - 5 + offset) as u32; } // goto_w
        other => return Err(VmOutcome::Vm(VmError::UnknownOpcode(other))),
    }
    Ok(Step::Continue)
}

fn load_constant(frame: &mut Frame, index: u16) -> VmResult<Value> {
    match frame.constants.get(index).map_err(io_vm)? {
        Constant::Integer(v) => Ok(Value::Int(*v)),
        Constant::Float(v) => Ok(Value::Float(*v)),
        Constant::Utf8(s) => Ok(Value::Ref(Some(ObjectHandle::string(s.clone())))),
        Constant::String { string_index } => {
            let text = frame.constants.utf8(*string_index).map_err(io_vm)?.to_string();
            Ok(Value::Ref(Some(ObjectHandle::string(text))))
        }
        Constant::Class { name_index } => {
            let name = frame.constants.utf8(*name_index).map_err(io_vm)?.to_string();
            Ok(Value::Ref(Some(ObjectHandle::class_mirror(name))))
        }
        other => Err(VmOutcome::Vm(VmError::Format(format!("ldc on unsupported constant {:?}", other)))),
    }
}

fn push_if_nonvoid(frame: &mut Frame, descriptor: &FieldDescriptor, result: Option<Value>) -> VmResult<()> {
    if returns_void(descriptor) {
        return Ok(());
    }
    let value = result.unwrap_or_else(|| match descriptor {
        FieldDescriptor::Method { returns, .. } => returns.initial_value(),
        _ => Value::null(),
    });
    frame.push(value).map_err(VmOutcome::Vm)
}

fn binary_int(frame: &mut Frame, op: impl Fn(i32, i32) -> i32) -> VmResult<()> {
    let b = frame.pop_int().map_err(VmOutcome::Vm)?;
    let a = frame.pop_int().map_err(VmOutcome::Vm)?;
    frame.push(Value::Int(op(a, b))).map_err(VmOutcome::Vm)
}

fn binary_long(frame: &mut Frame, op: impl Fn(i64, i64) -> i64) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0);
    frame.push(Value::Long(op(a, b))).map_err(VmOutcome::Vm)
}

fn binary_float(frame: &mut Frame, op: impl Fn(f32, f32) -> f32) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0);
    frame.push(Value::Float(op(a, b))).map_err(VmOutcome::Vm)
}

fn binary_double(frame: &mut Frame, op: impl Fn(f64, f64) -> f64) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0);
    frame.push(Value::Double(op(a, b))).map_err(VmOutcome::Vm)
}

fn checked_int_div(frame: &mut Frame, remainder: bool) -> VmResult<()> {
    let b = frame.pop_int().map_err(VmOutcome::Vm)?;
    let a = frame.pop_int().map_err(VmOutcome::Vm)?;
    if b == 0 {
        return Err(VmOutcome::Java(except::arithmetic("/ by zero")));
    }
    let result = if remainder { a.wrapping_rem(b) } else { a.wrapping_div(b) };
    frame.push(Value::Int(result)).map_err(VmOutcome::Vm)
}

fn checked_long_div(frame: &mut Frame, remainder: bool) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_long().unwrap_or(0);
    if b == 0 {
        return Err(VmOutcome::Java(except::arithmetic("/ by zero")));
    }
    let result = if remainder { a.wrapping_rem(b) } else { a.wrapping_div(b) };
    frame.push(Value::Long(result)).map_err(VmOutcome::Vm)
}

fn fcmp(frame: &mut Frame, nan_is_greater: bool) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_float().unwrap_or(0.0);
    let result = match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => if nan_is_greater { 1 } else { -1 },
    };
    frame.push(Value::Int(result)).map_err(VmOutcome::Vm)
}

fn dcmp(frame: &mut Frame, nan_is_greater: bool) -> VmResult<()> {
    let b = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0);
    let a = frame.pop().map_err(VmOutcome::Vm)?.as_double().unwrap_or(0.0);
    let result = match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => if nan_is_greater { 1 } else { -1 },
    };
    frame.push(Value::Int(result)).map_err(VmOutcome::Vm)
}

fn branch_if_int(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let offset = read_i16(frame) as i32;
    let v = frame.pop_int().map_err(VmOutcome::Vm)?;
    let taken = match opcode {
        0x99 => v == 0,
        0x9a => v != 0,
        0x9b => v < 0,
        0x9c => v >= 0,
        0x9d => v > 0,
        0x9e => v <= 0,
        _ => unreachable!(),
    };
    if taken {
        frame.pc = (frame.pc as i32 - 3 + offset) as u32;
    }
    Ok(())
}

fn branch_if_icmp(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let offset = read_i16(frame) as i32;
    let b = frame.pop_int().map_err(VmOutcome::Vm)?;
    let a = frame.pop_int().map_err(VmOutcome::Vm)?;
    let taken = match opcode {
        0x9f => a == b,
        0xa0 => a != b,
        0xa1 => a < b,
        0xa2 => a >= b,
        0xa3 => a > b,
        0xa4 => a <= b,
        _ => unreachable!(),
    };
    if taken {
        frame.pc = (frame.pc as i32 - 3 + offset) as u32;
    }
    Ok(())
}

fn branch_if_acmp(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let offset = read_i16(frame) as i32;
    let b = frame.pop_ref().map_err(VmOutcome::Vm)?;
    let a = frame.pop_ref().map_err(VmOutcome::Vm)?;
    let equal = match (&a, &b) {
        (Some(x), Some(y)) => x.ptr_eq(y),
        (None, None) => true,
        _ => false,
    };
    let taken = if opcode == 0xa5 { equal } else { !equal };
    if taken {
        frame.pc = (frame.pc as i32 - 3 + offset) as u32;
    }
    Ok(())
}

fn table_switch(frame: &mut Frame) -> VmResult<Step> {
    let instr_pc = frame.pc - 1;
    while frame.pc % 4 != 0 {
        read_u8(frame);
    }
    let default = read_i32(frame);
    let low = read_i32(frame);
    let high = read_i32(frame);
    let index = frame.pop_int().map_err(VmOutcome::Vm)?;
    let offset = if index < low || index > high {
        default
    } else {
        let entry_pc = frame.pc as usize + (index - low) as usize * 4;
        i32::from_be_bytes(frame.code[entry_pc..entry_pc + 4].try_into().unwrap())
    };
    frame.pc = (instr_pc as i32 + offset) as u32;
    Ok(Step::Continue)
}

fn lookup_switch(frame: &mut Frame) -> VmResult<Step> {
    let instr_pc = frame.pc - 1;
    while frame.pc % 4 != 0 {
        read_u8(frame);
    }
    let default = read_i32(frame);
    let count = read_i32(frame) as usize;
    let key = frame.pop_int().map_err(VmOutcome::Vm)?;
    let mut offset = default;
    for i in 0..count {
        let pair_pc = frame.pc as usize + i * 8;
        let match_key = i32::from_be_bytes(frame.code[pair_pc..pair_pc + 4].try_into().unwrap());
        if match_key == key {
            offset = i32::from_be_bytes(frame.code[pair_pc + 4..pair_pc + 8].try_into().unwrap());
            break;
        }
    }
    frame.pc = (instr_pc as i32 + offset) as u32;
    Ok(Step::Continue)
}

fn wide(frame: &mut Frame) -> VmResult<Step> {
    let modified_opcode = read_u8(frame);
    let idx = read_u16(frame) as usize;
    match modified_opcode {
        0x15..=0x19 => frame.push(frame.locals[idx]).map_err(VmOutcome::Vm)?, // wide *load
        0x36..=0x3a => { let v = frame.pop().map_err(VmOutcome::Vm)?; frame.locals[idx] = v; } // wide *store
        0x84 => {
            let delta = read_i16(frame) as i32;
            let current = frame.locals[idx].as_int().unwrap_or(0);
            frame.locals[idx] = Value::Int(current.wrapping_add(delta));
        }
        other => return Err(VmOutcome::Vm(VmError::Format(format!("unsupported wide-modified opcode 0x{:02x}", other)))),
    }
    Ok(Step::Continue)
}
