//! The constant pool: an immutable, 1-indexed sequence of tagged entries. Long and
//! double entries occupy two consecutive slots (the second is unused).

use byteorder::ReadBytesExt;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::{self, Error, ErrorKind, Read};

use crate::read::Readable;

#[derive(Debug, Clone)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: ReferenceKind,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Placeholder occupying the second slot of a long/double entry.
    Unusable,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, FromPrimitive)]
pub enum ReferenceKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl Readable for ReferenceKind {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        match ReferenceKind::from_u8(buffer.read_u8()?) {
            Some(v) => Ok(v),
            None => Err(Error::new(ErrorKind::InvalidData, "reference kind out of bounds")),
        }
    }
}

impl Constant {
    fn read_one<T: Read>(buffer: &mut T) -> io::Result<Self> {
        Ok(match buffer.read_u8()? {
            1 => {
                let length = u16::read(buffer)?;
                let mut bytes = vec![0; length as usize];
                buffer.read_exact(&mut bytes)?;
                Constant::Utf8(match cesu8::from_java_cesu8(&bytes) {
                    Ok(v) => v.into_owned(),
                    Err(e) => return Err(Error::new(ErrorKind::InvalidData, e)),
                })
            }
            3 => Constant::Integer(i32::read(buffer)?),
            4 => Constant::Float(f32::read(buffer)?),
            5 => Constant::Long(i64::read(buffer)?),
            6 => Constant::Double(f64::read(buffer)?),
            7 => Constant::Class { name_index: u16::read(buffer)? },
            8 => Constant::String { string_index: u16::read(buffer)? },
            9 => Constant::FieldRef {
                class_index: u16::read(buffer)?,
                name_and_type_index: u16::read(buffer)?,
            },
            10 => Constant::MethodRef {
                class_index: u16::read(buffer)?,
                name_and_type_index: u16::read(buffer)?,
            },
            11 => Constant::InterfaceMethodRef {
                class_index: u16::read(buffer)?,
                name_and_type_index: u16::read(buffer)?,
            },
            12 => Constant::NameAndType {
                name_index: u16::read(buffer)?,
                descriptor_index: u16::read(buffer)?,
            },
            15 => Constant::MethodHandle {
                reference_kind: ReferenceKind::read(buffer)?,
                reference_index: u16::read(buffer)?,
            },
            16 => Constant::MethodType { descriptor_index: u16::read(buffer)? },
            17 => Constant::Dynamic {
                bootstrap_method_attr_index: u16::read(buffer)?,
                name_and_type_index: u16::read(buffer)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method_attr_index: u16::read(buffer)?,
                name_and_type_index: u16::read(buffer)?,
            },
            19 => Constant::Module { name_index: u16::read(buffer)? },
            20 => Constant::Package { name_index: u16::read(buffer)? },
            tag => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid constant pool tag {}", tag),
                ))
            }
        })
    }

    pub fn as_utf8(&self) -> Option<&str> {
        match self {
            Constant::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A 1-indexed constant pool. Index 0 is never valid; long/double entries consume
/// the following index as an `Unusable` placeholder so indices stay aligned with
/// the class-file encoding.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Readable for ConstantPool {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        let count = u16::read(buffer)?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable); // index 0 placeholder

        let mut index = 1u16;
        while index < count {
            let constant = Constant::read_one(buffer)?;
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            index += 1;
            if wide {
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        Ok(ConstantPool { entries })
    }
}

impl ConstantPool {
    /// Builds a pool from already-tagged entries, index 0 included as `Unusable`. Used
    /// to hand-assemble synthetic classes for testing without going through the binary
    /// class-file grammar.
    pub fn from_entries(entries: Vec<Constant>) -> Self {
        ConstantPool { entries }
    }

    pub fn get(&self, index: u16) -> io::Result<&Constant> {
        self.entries
            .get(index as usize)
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("constant pool index {} out of range", index)))
    }

    pub fn utf8(&self, index: u16) -> io::Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s.as_str()),
            other => Err(Error::new(
                ErrorKind::InvalidData,
                format!("constant pool index {} is not Utf8: {:?}", index, other),
            )),
        }
    }

    pub fn class_name(&self, index: u16) -> io::Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(Error::new(
                ErrorKind::InvalidData,
                format!("constant pool index {} is not Class: {:?}", index, other),
            )),
        }
    }

    pub fn name_and_type(&self, index: u16) -> io::Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType { name_index, descriptor_index } => {
                Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
            }
            other => Err(Error::new(
                ErrorKind::InvalidData,
                format!("constant pool index {} is not NameAndType: {:?}", index, other),
            )),
        }
    }

    /// Resolves a field/method/interface-method ref to `(class_name, name, descriptor)`.
    pub fn resolve_ref(&self, index: u16) -> io::Result<(&str, &str, &str)> {
        let (class_index, nat_index) = match self.get(index)? {
            Constant::FieldRef { class_index, name_and_type_index }
            | Constant::MethodRef { class_index, name_and_type_index }
            | Constant::InterfaceMethodRef { class_index, name_and_type_index } => {
                (*class_index, *name_and_type_index)
            }
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("constant pool index {} is not a ref: {:?}", index, other),
                ))
            }
        };
        let class = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok((class, name, descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_entry_occupies_two_slots() {
        // tag=5 (Long), value=1; followed by tag=3 (Integer), value=7.
        let mut bytes = vec![0u8, 3]; // constant_pool_count = 3 (one real slot pair + one more)
        bytes.extend_from_slice(&[5]);
        bytes.extend_from_slice(&1i64.to_be_bytes());
        let pool = ConstantPool::read(&mut std::io::Cursor::new(bytes)).unwrap();
        assert!(matches!(pool.get(1).unwrap(), Constant::Long(1)));
        assert!(matches!(pool.get(2).unwrap(), Constant::Unusable));
    }
}
