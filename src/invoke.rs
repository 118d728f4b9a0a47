//! Method resolution, dispatch, field access, object/array creation, class
//! initialization, and `invokedynamic` bootstrap handling (§4.4, §4.6). This is the
//! layer the interpreter loop calls into for every non-arithmetic opcode; it never
//! touches `frame.pc` or the operand stack directly.

use log::{debug, trace};

use crate::class::attribute::Code;
use crate::class::constant::{Constant, ConstantPool};
use crate::class::descriptor::FieldDescriptor;
use crate::class::{Class, MethodAccessFlags};
use crate::env::JavaEnv;
use crate::error::{VmError, VmOutcome, VmResult};
use crate::except;
use crate::heap::{ArrayElementKind, Instance, JavaArray, LambdaTarget, Object, ObjectHandle};
use crate::loader::ClassRef;
use crate::natives;
use crate::value::{Frame, Value};

fn to_vm(result: std::io::Result<&str>) -> Result<&str, VmOutcome> {
    result.map_err(|e| VmOutcome::Vm(VmError::Io(e)))
}

/// Walks `start`'s superclass chain, `start` included, stopping at `Object` (whose
/// `super_class` is zero, §3).
fn superclass_chain(env: &JavaEnv, start: &str) -> Result<Vec<ClassRef>, VmError> {
    let mut chain = Vec::new();
    let mut current = Some(start.to_string());
    while let Some(name) = current {
        let class = env.load_class(&name)?;
        current = class.super_name().map(str::to_string);
        chain.push(class);
    }
    Ok(chain)
}

fn method_matches(class: &Class, index: usize, name: &str, descriptor: &str) -> bool {
    class.constants.utf8(class.methods[index].name_index).ok() == Some(name)
        && class.constants.utf8(class.methods[index].descriptor_index).ok() == Some(descriptor)
}

fn find_interface_method(
    env: &JavaEnv,
    interface_name: &str,
    name: &str,
    descriptor: &str,
) -> Result<Option<(ClassRef, usize)>, VmError> {
    let iface = env.load_class(interface_name)?;
    if let Some(idx) = (0..iface.methods.len()).find(|&i| method_matches(&iface, i, name, descriptor)) {
        return Ok(Some((iface, idx)));
    }
    for super_iface in iface.interface_names()? {
        if let Some(found) = find_interface_method(env, super_iface, name, descriptor)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Two-pass resolution (§4.4): the superclass chain first, then the same chain's
/// declared interfaces (recursively) for a default implementation. Failure is a
/// `VmError`, never a Java exception.
pub fn resolve_method(env: &JavaEnv, start_class: &str, name: &str, descriptor: &str) -> Result<(ClassRef, usize), VmError> {
    let chain = superclass_chain(env, start_class)?;

    for class in &chain {
        if let Some(idx) = (0..class.methods.len()).find(|&i| method_matches(class, i, name, descriptor)) {
            return Ok((class.clone(), idx));
        }
    }
    for class in &chain {
        for interface_name in class.interface_names()? {
            if let Some(found) = find_interface_method(env, interface_name, name, descriptor)? {
                return Ok(found);
            }
        }
    }
    Err(VmError::NoSuchMethod(start_class.to_string(), name.to_string(), descriptor.to_string()))
}

/// Assignability relation used by `instanceof`/`checkcast` and exception-handler
/// `catch_type` matching (§4.3, §7): reflexive, and transitive across both the
/// superclass chain and declared interfaces.
pub fn is_assignable(env: &JavaEnv, from_class: &str, to_class: &str) -> bool {
    if from_class == to_class || to_class == "java/lang/Object" {
        return true;
    }
    if let Some(from_inner) = from_class.strip_prefix('[') {
        if matches!(to_class, "java/lang/Cloneable" | "java/io/Serializable") {
            return true;
        }
        return match (from_inner.strip_prefix('L').and_then(|s| s.strip_suffix(';')), to_class.strip_prefix("[L").and_then(|s| s.strip_suffix(';'))) {
            (Some(from_elem), Some(to_elem)) => is_assignable(env, from_elem, to_elem),
            _ => false,
        };
    }

    let mut current = from_class.to_string();
    loop {
        let class = match env.load_class(&current) {
            Ok(c) => c,
            Err(_) => return false,
        };
        if let Ok(names) = class.interface_names() {
            for iface in names {
                if iface == to_class || is_assignable(env, iface, to_class) {
                    return true;
                }
            }
        }
        match class.super_name() {
            Some(s) if s == to_class => return true,
            Some(s) => current = s.to_string(),
            None => return false,
        }
    }
}

/// Runs `<clinit>` for `class_name` at most once per process (§4.6). Tolerates a
/// superclass that cannot be loaded; a Java exception thrown by `<clinit>` propagates
/// unchanged with the started-mark left in place.
pub fn initialize_class(env: &JavaEnv, class_name: &str) -> VmResult<()> {
    if env.is_init_started(class_name) {
        return Ok(());
    }
    let class = match env.load_class(class_name) {
        Ok(c) => c,
        Err(_) => return Ok(()), // the triggering opcode's own resolution reports this
    };
    env.begin_init(class_name);

    if let Some(super_name) = class.super_name() {
        let super_name = super_name.to_string();
        if let Err(outcome @ VmOutcome::Java(_)) = initialize_class(env, &super_name) {
            return Err(outcome);
        }
    }

    if let Some(idx) = (0..class.methods.len()).find(|&i| method_matches(&class, i, "<clinit>", "()V")) {
        debug!("running <clinit> for {}", class_name);
        exec_method(env, &class, idx, vec![])?;
    }
    Ok(())
}

pub fn new_instance(env: &JavaEnv, class_name: &str) -> VmResult<ObjectHandle> {
    initialize_class(env, class_name)?;
    Ok(ObjectHandle::instance(class_name))
}

pub fn new_array(element_kind: ArrayElementKind, element_type_name: Option<String>, length: i32) -> VmResult<ObjectHandle> {
    if length < 0 {
        return Err(VmOutcome::Java(except::negative_array_size(length)));
    }
    Ok(ObjectHandle::array(JavaArray::new(element_kind, element_type_name, length)))
}

pub fn get_field(receiver: Option<&ObjectHandle>, name: &str, descriptor: &FieldDescriptor) -> VmResult<Value> {
    let receiver = receiver.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
    receiver.with(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => Ok(fields.get(name).copied().unwrap_or_else(|| descriptor.initial_value())),
        _ => Err(VmOutcome::Vm(VmError::Format("getfield on a non-instance object".to_string()))),
    })
}

pub fn put_field(receiver: Option<&ObjectHandle>, name: &str, value: Value) -> VmResult<()> {
    let receiver = receiver.ok_or_else(|| VmOutcome::Java(except::null_pointer()))?;
    receiver.with_mut(|obj| match obj {
        Object::Instance(Instance { fields, .. }) => {
            fields.insert(name.to_string(), value);
            Ok(())
        }
        _ => Err(VmOutcome::Vm(VmError::Format("putfield on a non-instance object".to_string()))),
    })
}

/// `getstatic` (§3, §9): unset slots read as the descriptor-typed zero. `System.out`
/// and `System.err` resolve to a sentinel print-stream bound to the VM's output sink,
/// lazily materialized and cached on first read so repeated reads see the same object.
pub fn get_static(env: &JavaEnv, class_name: &str, field_name: &str, descriptor: &FieldDescriptor) -> VmResult<Value> {
    initialize_class(env, class_name)?;
    if class_name == "java/lang/System" && matches!(field_name, "out" | "err") {
        let existing = env.get_static(class_name, field_name, Value::null());
        if !existing.is_null() {
            return Ok(existing);
        }
        let sentinel = Value::Ref(Some(ObjectHandle::instance(natives::io::SENTINEL_CLASS)));
        env.put_static(class_name, field_name, sentinel);
        return Ok(sentinel);
    }
    Ok(env.get_static(class_name, field_name, descriptor.initial_value()))
}

pub fn put_static(env: &JavaEnv, class_name: &str, field_name: &str, value: Value) -> VmResult<()> {
    initialize_class(env, class_name)?;
    env.put_static(class_name, field_name, value);
    Ok(())
}

/// Executes a resolved method with `args` already marshaled as locals 0..n. Only a
/// method with no decoded bytecode at all diverts to the native dispatch table — a
/// method resolution found *with* a `Code` attribute always runs as bytecode,
/// regardless of whether its name happens to collide with a documented native triple.
pub fn exec_method(env: &JavaEnv, class: &ClassRef, method_index: usize, mut args: Vec<Value>) -> VmResult<Option<Value>> {
    let method = &class.methods[method_index];
    let name = to_vm(method.name(&class.constants))?.to_string();
    let descriptor = to_vm(method.descriptor(&class.constants))?.to_string();
    let class_name = class.name().to_string();

    let code: &Code = match method.code.as_ref() {
        Some(code) => code,
        None => {
            let native_args = args.clone();
            let receiver = if !method.access.contains(MethodAccessFlags::STATIC) && !native_args.is_empty() {
                match native_args[0] {
                    Value::Ref(Some(ref h)) => Some(h.clone()),
                    _ => None,
                }
            } else {
                None
            };
            let native_call_args: Vec<Value> = if receiver.is_some() { native_args[1..].to_vec() } else { native_args };

            let intercepted = match &receiver {
                Some(r) => natives::dispatch_instance(env, r, &class_name, &name, &descriptor, &native_call_args),
                None => natives::dispatch_static(env, &class_name, &name, &descriptor, &native_call_args),
            };
            return match intercepted {
                Some(result) => result,
                None => Err(VmOutcome::Vm(VmError::NoSuchMethod(class_name, name, descriptor))),
            };
        }
    };

    let _guard = match env.enter_frame() {
        Ok(guard) => guard,
        Err(VmError::StackOverflow(_)) => return Err(VmOutcome::Java(except::stack_overflow())),
        Err(e) => return Err(VmOutcome::Vm(e)),
    };
    trace!("entering {}.{}{} at depth {}", class_name, name, descriptor, env.frame_depth());

    let mut frame = Frame::new(code.max_locals, code.max_stack, &class_name, &class.constants, code.code.as_slice());
    if args.len() > frame.locals.len() {
        args.truncate(frame.locals.len());
    }
    for (slot, value) in frame.locals.iter_mut().zip(args.into_iter()) {
        *slot = value;
    }

    crate::interp::run(env, class, &mut frame, code)
}

/// Classes like `java/lang/Integer` or `java/lang/Math` are never backed by a decoded
/// class file at all (§4.5) — method resolution against them would just report
/// `ClassNotFound`, so every dispatch entry point tries the native tables before it
/// ever resolves or initializes a class.
pub fn invoke_static(env: &JavaEnv, class_name: &str, name: &str, descriptor: &str, args: Vec<Value>) -> VmResult<Option<Value>> {
    if let Some(result) = natives::dispatch_static(env, class_name, name, descriptor, &args) {
        return result;
    }
    initialize_class(env, class_name)?;
    let (class, idx) = resolve_method(env, class_name, name, descriptor).map_err(VmOutcome::Vm)?;
    exec_method(env, &class, idx, args)
}

/// `invokespecial` (§4.4): resolves from the constant pool's class, never the
/// receiver's runtime class. `Object.<init>` is a documented no-op shortcut. Generic
/// resolution is tried before the `Object` identity-method fallback, so a real
/// `<init>`/`toString`/`equals`/`hashCode`/`getClass` override always wins.
pub fn invoke_special(
    env: &JavaEnv,
    class_name: &str,
    name: &str,
    descriptor: &str,
    receiver: ObjectHandle,
    args: Vec<Value>,
) -> VmResult<Option<Value>> {
    if class_name == "java/lang/Object" && name == "<init>" {
        return Ok(None);
    }
    if let Some(result) = natives::dispatch_instance(env, &receiver, class_name, name, descriptor, &args) {
        return result;
    }
    match resolve_method(env, class_name, name, descriptor) {
        Ok((class, idx)) => {
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(Value::Ref(Some(receiver)));
            call_args.extend(args);
            exec_method(env, &class, idx, call_args)
        }
        Err(e) => match natives::dispatch_instance_fallback(&receiver, name, descriptor, &args) {
            Some(result) => result,
            None => Err(VmOutcome::Vm(e)),
        },
    }
}

/// `invokevirtual` (§4.4, §9): the dispatch target's defining class comes from the
/// *receiver's* runtime class, not the pool's. Native-backed receivers with no
/// decoded class file at all (host strings, builders, boxed primitives) are diverted
/// before resolution is attempted, since resolving against them would just report
/// `ClassNotFound`; the `Object` identity-method fallback, by contrast, is tried only
/// after resolution has failed to find a user override, so it never shadows one.
pub fn invoke_virtual(env: &JavaEnv, name: &str, descriptor: &str, receiver: ObjectHandle, args: Vec<Value>) -> VmResult<Option<Value>> {
    let runtime_class = receiver.class_name();
    if let Some(result) = natives::dispatch_instance(env, &receiver, &runtime_class, name, descriptor, &args) {
        return result;
    }
    if let Some(result) = try_lambda_dispatch(env, &receiver, name, args.clone()) {
        return result;
    }
    match resolve_method(env, &runtime_class, name, descriptor) {
        Ok((class, idx)) => {
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(Value::Ref(Some(receiver)));
            call_args.extend(args);
            exec_method(env, &class, idx, call_args)
        }
        Err(e) => match natives::dispatch_instance_fallback(&receiver, name, descriptor, &args) {
            Some(result) => result,
            None => Err(VmOutcome::Vm(e)),
        },
    }
}

/// `invokeinterface` (§4.4): identical dispatch to `invokevirtual`, plus the lambda
/// proxy check called out in §4.4/§9.
pub fn invoke_interface(env: &JavaEnv, name: &str, descriptor: &str, receiver: ObjectHandle, args: Vec<Value>) -> VmResult<Option<Value>> {
    invoke_virtual(env, name, descriptor, receiver, args)
}

/// A receiver carrying a `lambda_target` whose `method_name` matches dispatches to the
/// target with `captured_args` prepended to the call arguments (§4.4, §9), bypassing
/// ordinary method resolution entirely since no class file backs the proxy.
fn try_lambda_dispatch(env: &JavaEnv, receiver: &ObjectHandle, method_name: &str, args: Vec<Value>) -> Option<VmResult<Option<Value>>> {
    let target = receiver.with(|obj| match obj {
        Object::Instance(Instance { lambda_target: Some(lt), .. }) if lt.method_name == method_name => Some(lt.clone()),
        _ => None,
    })?;

    let mut call_args = target.captured_args.clone();
    call_args.extend(args);

    Some(if target.is_static {
        invoke_static(env, &target.target_class, &target.target_method, &target.target_descriptor, call_args)
    } else if call_args.is_empty() {
        Err(VmOutcome::Java(except::null_pointer()))
    } else {
        let self_recv = call_args.remove(0);
        match self_recv {
            Value::Ref(Some(h)) => invoke_virtual(env, &target.target_method, &target.target_descriptor, h, call_args),
            _ => Err(VmOutcome::Java(except::null_pointer())),
        }
    })
}

/// `invokedynamic` (§4.4): supports the two bootstrap methods the spec names,
/// `LambdaMetafactory.metafactory` and `StringConcatFactory.makeConcatWithConstants`.
pub fn invoke_dynamic(env: &JavaEnv, class: &ClassRef, invoke_dynamic_index: u16, args: Vec<Value>) -> VmResult<Option<Value>> {
    let pool = &class.constants;
    let (bootstrap_index, name_and_type_index) = match pool.get(invoke_dynamic_index) {
        Ok(Constant::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index }) => {
            (*bootstrap_method_attr_index, *name_and_type_index)
        }
        _ => return Err(VmOutcome::Vm(VmError::Format("invokedynamic index is not InvokeDynamic".into()))),
    };
    let (call_site_name, call_site_descriptor) = {
        let (n, d) = pool.name_and_type(name_and_type_index).map_err(io_err)?;
        (n.to_string(), d.to_string())
    };

    let bootstrap = class
        .bootstrap_methods
        .methods
        .get(bootstrap_index as usize)
        .ok_or_else(|| VmOutcome::Vm(VmError::Format("bootstrap method index out of range".into())))?;

    let (bsm_class, bsm_name, _) = pool.resolve_ref(method_handle_ref(pool, bootstrap.method_ref)?).map_err(io_err)?;

    match (bsm_class, bsm_name) {
        ("java/lang/invoke/LambdaMetafactory", "metafactory") => {
            let target_handle_index = *bootstrap.arguments.get(1).ok_or_else(|| {
                VmOutcome::Vm(VmError::Format("metafactory bootstrap missing implementation argument".into()))
            })?;
            let target_ref_index = method_handle_ref(pool, target_handle_index)?;
            let (target_class, target_method, target_descriptor) = pool.resolve_ref(target_ref_index).map_err(io_err)?;
            let is_static = matches!(pool.get(target_handle_index), Ok(Constant::MethodHandle { reference_kind, .. })
                if matches!(reference_kind, crate::class::constant::ReferenceKind::InvokeStatic));

            let interface_name = FieldDescriptor::parse_method(&call_site_descriptor)
                .ok()
                .and_then(|d| match d {
                    FieldDescriptor::Method { returns, .. } => match *returns {
                        FieldDescriptor::Object(name) => Some(name),
                        _ => None,
                    },
                    _ => None,
                })
                .ok_or_else(|| VmOutcome::Vm(VmError::BadDescriptor(call_site_descriptor.clone())))?;

            let lambda = LambdaTarget {
                interface_name: interface_name.clone(),
                method_name: call_site_name.clone(),
                target_class: target_class.to_string(),
                target_method: target_method.to_string(),
                target_descriptor: target_descriptor.to_string(),
                captured_args: args,
                is_static,
            };
            let handle = ObjectHandle::instance(interface_name);
            handle.with_mut(|obj| {
                if let Object::Instance(i) = obj {
                    i.lambda_target = Some(lambda);
                }
            });
            Ok(Some(Value::Ref(Some(handle))))
        }
        ("java/lang/invoke/StringConcatFactory", "makeConcatWithConstants") => {
            let recipe = bootstrap_string_arg(pool, bootstrap.arguments.first().copied())?;
            let constants = bootstrap
                .arguments
                .iter()
                .skip(1)
                .map(|&idx| bootstrap_display_arg(pool, idx))
                .collect::<Result<Vec<_>, _>>()?;
            let text = natives::string::build_concat(&recipe, &constants, args);
            Ok(Some(Value::Ref(Some(ObjectHandle::string(text)))))
        }
        _ => Err(VmOutcome::Vm(VmError::Format(format!("unsupported invokedynamic bootstrap {}.{}", bsm_class, bsm_name)))),
    }
}

fn method_handle_ref(pool: &ConstantPool, index: u16) -> VmResult<u16> {
    match pool.get(index) {
        Ok(Constant::MethodHandle { reference_index, .. }) => Ok(*reference_index),
        _ => Err(VmOutcome::Vm(VmError::Format("expected a MethodHandle constant".into()))),
    }
}

fn io_err(e: std::io::Error) -> VmOutcome {
    VmOutcome::Vm(VmError::Io(e))
}

fn bootstrap_string_arg(pool: &ConstantPool, index: Option<u16>) -> VmResult<String> {
    let index = index.ok_or_else(|| VmOutcome::Vm(VmError::Format("makeConcatWithConstants missing recipe argument".into())))?;
    match pool.get(index).map_err(io_err)? {
        Constant::String { string_index } => Ok(to_vm(pool.utf8(*string_index))?.to_string()),
        Constant::Utf8(s) => Ok(s.clone()),
        _ => Err(VmOutcome::Vm(VmError::Format("recipe argument is not a string constant".into()))),
    }
}

fn bootstrap_display_arg(pool: &ConstantPool, index: u16) -> VmResult<String> {
    match pool.get(index).map_err(io_err)? {
        Constant::String { string_index } => Ok(to_vm(pool.utf8(*string_index))?.to_string()),
        Constant::Utf8(s) => Ok(s.clone()),
        Constant::Integer(v) => Ok(v.to_string()),
        Constant::Long(v) => Ok(v.to_string()),
        Constant::Float(v) => Ok(natives::format::java_float_to_string(*v)),
        Constant::Double(v) => Ok(natives::format::java_double_to_string(*v)),
        other => Err(VmOutcome::Vm(VmError::Format(format!("unsupported concat constant {:?}", other)))),
    }
}
