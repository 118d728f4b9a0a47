//! Interpreter-level scenarios exercised against hand-assembled `Class` values rather
//! than real `.class` files: each test builds a constant pool and a `Code` body
//! directly, bypassing the binary grammar entirely, then drives it through
//! `invoke::exec_method` the same way `invokestatic` would.

use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use oxjvm::class::attribute::{BootstrapMethods, Code, ExceptionBounds};
use oxjvm::class::constant::{Constant, ConstantPool};
use oxjvm::class::{Class, ClassAccessFlags, ClassVersion, MethodAccessFlags, MethodInfo};
use oxjvm::env::JavaEnv;
use oxjvm::error::VmOutcome;
use oxjvm::invoke;
use oxjvm::loader::{ClassLoader, ModuleArchiveLoader};
use oxjvm::read::BinarySection;
use oxjvm::value::Value;

fn empty_module_archive_bytes() -> Vec<u8> {
    let mut out = vec![0u8, 0, 0, 0];
    let writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
    let cursor = writer.finish().unwrap();
    out.extend_from_slice(cursor.get_ref());
    out
}

fn test_env() -> JavaEnv {
    let bootstrap = ModuleArchiveLoader::open(empty_module_archive_bytes()).unwrap();
    let loader = ClassLoader::new(bootstrap, PathBuf::from("."));
    JavaEnv::new(loader, Box::new(io::sink()))
}

/// One static method, no fields, `java/lang/Object` as its superclass — enough shape
/// for `resolve_method`/`initialize_class` machinery that never actually runs here
/// (a direct `exec_method` call skips resolution) but keeps the `Class` well-formed.
fn single_method_class(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
    exception_table: Vec<ExceptionBounds>,
) -> Rc<Class> {
    let constants = ConstantPool::from_entries(vec![
        Constant::Unusable,
        Constant::Utf8(class_name.to_string()),       // 1
        Constant::Class { name_index: 1 },             // 2 (this_class)
        Constant::Utf8("java/lang/Object".to_string()), // 3
        Constant::Class { name_index: 3 },              // 4 (super_class)
        Constant::Utf8(method_name.to_string()),        // 5
        Constant::Utf8(descriptor.to_string()),         // 6
    ]);

    let method = MethodInfo {
        access: MethodAccessFlags::STATIC,
        name_index: 5,
        descriptor_index: 6,
        attributes: vec![],
        code: Some(Code {
            max_stack,
            max_locals,
            code: BinarySection::from_vec(code),
            exception_table,
            attributes: vec![],
        }),
    };

    Rc::new(Class {
        version: ClassVersion { minor: 0, major: 52 },
        constants,
        access_flags: ClassAccessFlags::empty(),
        this_class: 2,
        super_class: 4,
        interfaces: vec![],
        fields: vec![],
        methods: vec![method],
        attributes: vec![],
        bootstrap_methods: BootstrapMethods::default(),
    })
}

#[test]
fn add_two_ints() {
    let env = test_env();
    // iload_0, iload_1, iadd, ireturn
    let class = single_method_class("Calc", "add", "(II)I", vec![0x1a, 0x1b, 0x60, 0xac], 2, 2, vec![]);

    let result = invoke::exec_method(&env, &class, 0, vec![Value::Int(3), Value::Int(4)]).unwrap();
    assert_eq!(result, Some(Value::Int(7)));
}

#[test]
fn factorial_loop() {
    let env = test_env();
    // locals: 0=n, 1=result, 2=i
    let code = vec![
        0x04, // iconst_1          result = 1
        0x3c, // istore_1
        0x04, // iconst_1          i = 1
        0x3d, // istore_2
        0x1c, // loop: iload_2
        0x1a, // iload_0
        0xa3, 0x00, 0x0d, // if_icmpgt +13 -> end (pc19)
        0x1b, // iload_1
        0x1c, // iload_2
        0x68, // imul
        0x3c, // istore_1
        0x84, 0x02, 0x01, // iinc 2, +1
        0xa7, 0xff, 0xf4, // goto -12 -> loop (pc4)
        0x1b, // end: iload_1
        0xac, // ireturn
    ];
    let class = single_method_class("Calc", "fact", "(I)I", code, 2, 3, vec![]);

    let result = invoke::exec_method(&env, &class, 0, vec![Value::Int(5)]).unwrap();
    assert_eq!(result, Some(Value::Int(120)));

    let base_case = invoke::exec_method(&env, &class, 0, vec![Value::Int(0)]).unwrap();
    assert_eq!(base_case, Some(Value::Int(1)));
}

#[test]
fn division_by_zero_is_caught() {
    let env = test_env();
    // iload_0, iload_1, idiv, ireturn | handler: pop, iconst_m1, ireturn
    let code = vec![0x1a, 0x1b, 0x6c, 0xac, 0x57, 0x02, 0xac];
    let exception_table = vec![ExceptionBounds { start_pc: 0, end_pc: 4, handler_pc: 4, catch_type: 0 }];
    let class = single_method_class("Calc", "safeDivide", "(II)I", code, 2, 2, exception_table);

    let caught = invoke::exec_method(&env, &class, 0, vec![Value::Int(10), Value::Int(0)]).unwrap();
    assert_eq!(caught, Some(Value::Int(-1)));

    let ok = invoke::exec_method(&env, &class, 0, vec![Value::Int(10), Value::Int(2)]).unwrap();
    assert_eq!(ok, Some(Value::Int(5)));
}

#[test]
fn uncaught_exception_escapes_as_java_outcome() {
    let env = test_env();
    // No handler covers pc 2, so the ArithmeticException propagates past exec_method.
    let code = vec![0x1a, 0x1b, 0x6c, 0xac];
    let class = single_method_class("Calc", "divide", "(II)I", code, 2, 2, vec![]);

    match invoke::exec_method(&env, &class, 0, vec![Value::Int(1), Value::Int(0)]) {
        Err(VmOutcome::Java(exception)) => assert_eq!(exception.class_name(), "java/lang/ArithmeticException"),
        other => panic!("expected an uncaught ArithmeticException, got {:?}", other),
    }
}

#[test]
fn array_store_and_load_round_trip() {
    let env = test_env();
    // Builds a 3-element int[] with newarray, fills it via dup+iastore, then sums it
    // back out with iaload — exercises the operand-stack shuffling xastore relies on.
    let code = vec![
        0x06, // iconst_3
        0xbc, 0x0a, // newarray T_INT
        0x59, // dup
        0x03, // iconst_0
        0x10, 0x0a, // bipush 10
        0x4f, // iastore
        0x59, // dup
        0x04, // iconst_1
        0x10, 0x14, // bipush 20
        0x4f, // iastore
        0x59, // dup
        0x05, // iconst_2
        0x10, 0x1e, // bipush 30
        0x4f, // iastore
        0x4c, // astore_1
        0x1b, 0x03, 0x2e, // iload_1, iconst_0, iaload
        0x1b, 0x04, 0x2e, // iload_1, iconst_1, iaload
        0x60, // iadd
        0x1b, 0x05, 0x2e, // iload_1, iconst_2, iaload
        0x60, // iadd
        0xac, // ireturn
    ];
    let class = single_method_class("Arr", "sumArray", "()I", code, 4, 2, vec![]);

    let result = invoke::exec_method(&env, &class, 0, vec![]).unwrap();
    assert_eq!(result, Some(Value::Int(60)));
}

#[test]
fn array_index_out_of_bounds_is_a_java_exception() {
    let env = test_env();
    // iconst_1 (length 1 array), newarray, iconst_5 (bad index), iconst_0, iastore
    let code = vec![0x04, 0xbc, 0x0a, 0x08, 0x03, 0x4f, 0xb1];
    let class = single_method_class("Arr", "outOfBounds", "()V", code, 3, 0, vec![]);

    match invoke::exec_method(&env, &class, 0, vec![]) {
        Err(VmOutcome::Java(exception)) => assert_eq!(exception.class_name(), "java/lang/ArrayIndexOutOfBoundsException"),
        other => panic!("expected an ArrayIndexOutOfBoundsException, got {:?}", other),
    }
}

#[test]
fn field_access_reads_back_a_written_value_and_defaults_to_zero() {
    use oxjvm::class::descriptor::FieldDescriptor;
    use oxjvm::heap::ObjectHandle;

    let receiver = ObjectHandle::instance("Point");
    assert_eq!(invoke::get_field(Some(&receiver), "x", &FieldDescriptor::Int).unwrap(), Value::Int(0));

    invoke::put_field(Some(&receiver), "x", Value::Int(42)).unwrap();
    assert_eq!(invoke::get_field(Some(&receiver), "x", &FieldDescriptor::Int).unwrap(), Value::Int(42));
}

#[test]
fn is_assignable_treats_object_as_a_universal_supertype() {
    let env = test_env();
    assert!(invoke::is_assignable(&env, "java/lang/String", "java/lang/Object"));
    assert!(invoke::is_assignable(&env, "java/lang/String", "java/lang/String"));
    assert!(!invoke::is_assignable(&env, "java/lang/Object", "java/lang/String"));
}

#[test]
fn new_instance_works_for_natively_backed_classes_with_no_class_file() {
    let env = test_env();
    let handle = invoke::new_instance(&env, "java/lang/Integer").unwrap();
    assert_eq!(handle.class_name(), "java/lang/Integer");
}
