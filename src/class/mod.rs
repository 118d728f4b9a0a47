//! Class-file decoding: binary stream in, typed `ClassFile` out (§4.1).

pub mod attribute;
pub mod constant;
pub mod descriptor;

use bitflags::bitflags;
use std::io::{self, Error, ErrorKind, Read};

use crate::read::Readable;
use crate::simple_grammar;
use attribute::{AttributeInfo, BootstrapMethods, Code};
use constant::ConstantPool;
use descriptor::FieldDescriptor;

bitflags! {
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

macro_rules! impl_flags_readable {
    ($ty:ident) => {
        impl Readable for $ty {
            fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
                match $ty::from_bits(u16::read(buffer)?) {
                    Some(v) => Ok(v),
                    None => Err(Error::new(ErrorKind::InvalidData, concat!("malformed ", stringify!($ty)))),
                }
            }
        }
    };
}

impl_flags_readable!(ClassAccessFlags);
impl_flags_readable!(MethodAccessFlags);
impl_flags_readable!(FieldAccessFlags);

/// Consumes and validates the `0xCAFEBABE` magic header.
#[derive(Debug, Copy, Clone)]
struct ClassMagic;

impl Readable for ClassMagic {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        if u32::read(buffer)? != 0xCAFE_BABE {
            return Err(Error::new(ErrorKind::InvalidData, "bad magic bytes, expected 0xCAFEBABE"));
        }
        Ok(ClassMagic)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassVersion {
    pub minor: u16,
    pub major: u16,
}

impl Readable for ClassVersion {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(ClassVersion { minor: u16::read(buffer)?, major: u16::read(buffer)? })
    }
}

/// Class-format major version this VM accepts (§1: up to 61, i.e. Java 17).
pub const MAX_MAJOR_VERSION: u16 = 61;

simple_grammar! {
    #[derive(Debug, Clone)]
    pub struct FieldInfo {
        pub access: FieldAccessFlags,
        pub name_index: u16,
        pub descriptor_index: u16,
        pub attributes: Vec<AttributeInfo>,
    }

    #[derive(Debug, Clone)]
    pub struct RawMethodInfo {
        pub access: MethodAccessFlags,
        pub name_index: u16,
        pub descriptor_index: u16,
        pub attributes: Vec<AttributeInfo>,
    }
}

/// A method with its `Code` attribute (if any) already unpacked.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
    pub code: Option<Code>,
}

impl MethodInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> io::Result<&'a str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> io::Result<&'a str> {
        pool.utf8(self.descriptor_index)
    }

    pub fn field_descriptor(&self, pool: &ConstantPool) -> io::Result<FieldDescriptor> {
        FieldDescriptor::parse_method(self.descriptor(pool)?)
    }
}

#[derive(Debug, Clone)]
pub struct Class {
    pub version: ClassVersion,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
    pub bootstrap_methods: BootstrapMethods,
}

impl Readable for Class {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        simple_grammar! {
            struct RawClass {
                _magic: ClassMagic,
                version: ClassVersion,
                constants: ConstantPool,
                access_flags: ClassAccessFlags,
                this_class: u16,
                super_class: u16,
                interfaces: Vec<u16>,
                fields: Vec<FieldInfo>,
                methods: Vec<RawMethodInfo>,
                attributes: Vec<AttributeInfo>,
            }
        }

        let raw = RawClass::read(buffer)?;

        if raw.version.major > MAX_MAJOR_VERSION {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("class-format major version {} exceeds supported {}", raw.version.major, MAX_MAJOR_VERSION),
            ));
        }

        let mut methods = Vec::with_capacity(raw.methods.len());
        for method in raw.methods {
            let code = Code::from_attributes(&method.attributes, &raw.constants)?;
            if code.is_none()
                && !method.access.contains(MethodAccessFlags::NATIVE)
                && !method.access.contains(MethodAccessFlags::ABSTRACT)
            {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "method {} has no Code attribute and is neither native nor abstract",
                        raw.constants.utf8(method.name_index).unwrap_or("?")
                    ),
                ));
            }
            methods.push(MethodInfo {
                access: method.access,
                name_index: method.name_index,
                descriptor_index: method.descriptor_index,
                attributes: method.attributes,
                code,
            });
        }

        let bootstrap_methods = BootstrapMethods::from_attributes(&raw.attributes, &raw.constants)?;

        Ok(Class {
            version: raw.version,
            constants: raw.constants,
            access_flags: raw.access_flags,
            this_class: raw.this_class,
            super_class: raw.super_class,
            interfaces: raw.interfaces,
            fields: raw.fields,
            methods,
            attributes: raw.attributes,
            bootstrap_methods,
        })
    }
}

impl Class {
    pub fn name(&self) -> &str {
        self.constants.class_name(self.this_class).unwrap_or("<invalid>")
    }

    pub fn super_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            return None;
        }
        self.constants.class_name(self.super_class).ok()
    }

    pub fn interface_names(&self) -> io::Result<Vec<&str>> {
        self.interfaces.iter().map(|&idx| self.constants.class_name(idx)).collect()
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.constants.utf8(m.name_index).ok() == Some(name)
                && self.constants.utf8(m.descriptor_index).ok() == Some(descriptor)
        })
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| self.constants.utf8(f.name_index).ok() == Some(name))
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0u8, 0, 0, 0];
        assert!(Class::read(&mut std::io::Cursor::new(bytes)).is_err());
    }
}
