//! `JavaEnv` ties together the class loader, the static-field store, the class
//! initialization ledger, and the VM's output sink (§3: "Shared state"). All of it is
//! mutated by the single interpreter thread (§5), so plain `RefCell`/`Cell` interior
//! mutability is enough — there is no real concurrency to guard against.

use hashbrown::{HashMap, HashSet};
use std::cell::{Cell, RefCell};
use std::io::Write;

use crate::loader::{ClassLoader, ClassRef};
use crate::natives::NativeTable;
use crate::value::Value;
use crate::VmError;

/// Bounds recursion depth so runaway recursion aborts the VM instead of overflowing the
/// host call stack (§5).
pub const MAX_FRAME_DEPTH: usize = 1024;

pub struct JavaEnv {
    pub loader: ClassLoader,
    statics: RefCell<HashMap<String, HashMap<String, Value>>>,
    init_started: RefCell<HashSet<String>>,
    pub natives: NativeTable,
    pub out: RefCell<Box<dyn Write>>,
    frame_depth: Cell<usize>,
}

/// RAII guard that decrements the frame-depth counter on drop, including on unwind
/// through a thrown Java exception — so an exception caught partway up the call stack
/// leaves the depth counter consistent.
pub struct FrameDepthGuard<'e> {
    env: &'e JavaEnv,
}

impl<'e> Drop for FrameDepthGuard<'e> {
    fn drop(&mut self) {
        self.env.frame_depth.set(self.env.frame_depth.get() - 1);
    }
}

impl JavaEnv {
    pub fn new(loader: ClassLoader, out: Box<dyn Write>) -> Self {
        JavaEnv {
            loader,
            statics: RefCell::new(HashMap::new()),
            init_started: RefCell::new(HashSet::new()),
            natives: NativeTable::new(),
            out: RefCell::new(out),
            frame_depth: Cell::new(0),
        }
    }

    pub fn load_class(&self, name: &str) -> Result<ClassRef, VmError> {
        self.loader.load(name)
    }

    pub fn enter_frame(&self) -> Result<FrameDepthGuard<'_>, VmError> {
        let depth = self.frame_depth.get() + 1;
        if depth > MAX_FRAME_DEPTH {
            return Err(VmError::StackOverflow(depth));
        }
        self.frame_depth.set(depth);
        Ok(FrameDepthGuard { env: self })
    }

    pub fn frame_depth(&self) -> usize {
        self.frame_depth.get()
    }

    /// Reads a static field, returning the descriptor-typed zero if it was never
    /// written (§9, "static-field initial read").
    pub fn get_static(&self, class: &str, field: &str, default_when_unset: Value) -> Value {
        self.statics
            .borrow()
            .get(class)
            .and_then(|fields| fields.get(field))
            .copied()
            .unwrap_or(default_when_unset)
    }

    pub fn put_static(&self, class: &str, field: &str, value: Value) {
        self.statics.borrow_mut().entry(class.to_string()).or_default().insert(field.to_string(), value);
    }

    /// Marks `class` as having started initialization. Returns `true` if this is the
    /// first time (the caller should now run `<clinit>`); `<clinit>` runs at most once
    /// per process even under recursive triggering (§8).
    pub fn begin_init(&self, class: &str) -> bool {
        self.init_started.borrow_mut().insert(class.to_string())
    }

    pub fn is_init_started(&self, class: &str) -> bool {
        self.init_started.borrow().contains(class)
    }

    pub fn write_out(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}
