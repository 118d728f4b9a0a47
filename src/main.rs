//! CLI entry point (§6): `oxjvm <path-to-Main.class> [args...]`. The file's stem
//! becomes the main class name and its directory the user classpath entry; the module
//! archive supplying the bootstrap-loaded JDK classes is located via `path`.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use log::error;

use oxjvm::env::JavaEnv;
use oxjvm::error::VmOutcome;
use oxjvm::heap::{ArrayElementKind, JavaArray, ObjectHandle};
use oxjvm::invoke;
use oxjvm::loader::{ClassLoader, ModuleArchiveLoader};
use oxjvm::value::Value;
use oxjvm::{path, except};

fn main() -> ExitCode {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let class_file = match args.next() {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: oxjvm <path-to-Main.class> [args...]");
            return ExitCode::FAILURE;
        }
    };
    let program_args: Vec<String> = args.collect();

    match run(&class_file, &program_args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("oxjvm: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(class_file: &PathBuf, program_args: &[String]) -> Result<(), String> {
    let main_class_name = path::main_class_name(class_file)
        .ok_or_else(|| format!("cannot derive a main class name from {}", class_file.display()))?;
    let classpath = path::classpath_dir_for(class_file);

    let archive_path = path::find_module_archive().map_err(|e| e.to_string())?;
    let archive_bytes = std::fs::read(&archive_path)
        .map_err(|e| format!("reading module archive {}: {}", archive_path.display(), e))?;
    let bootstrap = ModuleArchiveLoader::open(archive_bytes).map_err(|e| e.to_string())?;
    let loader = ClassLoader::new(bootstrap, classpath);
    let env = JavaEnv::new(loader, Box::new(io::stdout()));

    let array = ObjectHandle::array(JavaArray::new(
        ArrayElementKind::Reference,
        Some("java/lang/String".to_string()),
        program_args.len() as i32,
    ));
    array.with_mut(|obj| {
        if let oxjvm::heap::Object::Array(a) = obj {
            for (slot, arg) in a.elements.iter_mut().zip(program_args.iter()) {
                *slot = Value::Ref(Some(ObjectHandle::string(arg.clone())));
            }
        }
    });

    let result = invoke::invoke_static(&env, &main_class_name, "main", "([Ljava/lang/String;)V", vec![Value::Ref(Some(array))]);
    match result {
        Ok(_) => Ok(()),
        Err(VmOutcome::Java(exception)) => {
            let message = except::message_of(&exception).unwrap_or_default();
            Err(format!("Exception in thread \"main\" {}: {}", exception.class_name(), message))
        }
        Err(VmOutcome::Vm(e)) => Err(e.to_string()),
    }
}
