//! Attributes attached to classes, fields, and methods. Only the attributes this VM
//! interprets (`Code`, `BootstrapMethods`) are given dedicated structure; all others are
//! kept as opaque bytes. Stack-map frames are explicitly out of scope (verification is
//! not performed), so `StackMapTable` is recognized only by name and its bytes skipped.

use crate::read::{BinarySection, Readable};
use crate::simple_grammar;
use std::io::{self, Cursor, Read};

simple_grammar! {
    /// An attribute of indeterminate type: one of the reserved attribute names or a
    /// custom one. Resolving `name_index` against the owning class's pool tells a
    /// reader which of them it is.
    #[derive(Debug, Clone)]
    pub struct AttributeInfo {
        pub name_index: u16,
        pub info: BinarySection,
    }

    /// Per-method `try`/`catch` bounds. `start_pc` is inclusive, `end_pc` exclusive;
    /// `catch_type` of zero matches any exception (used for `finally` blocks).
    #[derive(Debug, Copy, Clone)]
    pub struct ExceptionBounds {
        pub start_pc: u16,
        pub end_pc: u16,
        pub handler_pc: u16,
        pub catch_type: u16,
    }

    /// The `Code` attribute: the bytecode and exception table for one method.
    #[derive(Debug, Clone)]
    pub struct Code {
        pub max_stack: u16,
        pub max_locals: u16,
        pub code: BinarySection,
        pub exception_table: Vec<ExceptionBounds>,
        pub attributes: Vec<AttributeInfo>,
    }

    /// `BootstrapMethods`, used by `invokedynamic` call sites.
    #[derive(Debug, Clone)]
    pub struct BootstrapMethod {
        pub method_ref: u16,
        pub arguments: Vec<u16>,
    }
}

impl ExceptionBounds {
    pub fn covers(&self, pc: u16) -> bool {
        pc >= self.start_pc && pc < self.end_pc
    }
}

impl AttributeInfo {
    /// Finds and parses a class/method/field-level attribute by its constant-pool name.
    pub fn find_by_name<'a>(
        attributes: &'a [AttributeInfo],
        pool: &crate::class::constant::ConstantPool,
        name: &str,
    ) -> Option<&'a AttributeInfo> {
        attributes
            .iter()
            .find(|attr| pool.utf8(attr.name_index).map(|n| n == name).unwrap_or(false))
    }
}

impl Code {
    pub fn from_attributes(
        attributes: &[AttributeInfo],
        pool: &crate::class::constant::ConstantPool,
    ) -> io::Result<Option<Code>> {
        match AttributeInfo::find_by_name(attributes, pool, "Code") {
            Some(attr) => {
                let mut buffer = Cursor::new(&*attr.info);
                Ok(Some(Code::read(&mut buffer)?))
            }
            None => Ok(None),
        }
    }
}

/// `BootstrapMethods` is a class-level attribute wrapping a `u16`-counted vector of
/// `BootstrapMethod` entries, each with its own `u16`-counted argument index list.
#[derive(Debug, Clone, Default)]
pub struct BootstrapMethods {
    pub methods: Vec<BootstrapMethod>,
}

impl Readable for BootstrapMethods {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(BootstrapMethods { methods: <Vec<BootstrapMethod>>::read(buffer)? })
    }
}

impl BootstrapMethods {
    pub fn from_attributes(
        attributes: &[AttributeInfo],
        pool: &crate::class::constant::ConstantPool,
    ) -> io::Result<BootstrapMethods> {
        match AttributeInfo::find_by_name(attributes, pool, "BootstrapMethods") {
            Some(attr) => {
                let mut buffer = Cursor::new(&*attr.info);
                BootstrapMethods::read(&mut buffer)
            }
            None => Ok(BootstrapMethods::default()),
        }
    }
}
