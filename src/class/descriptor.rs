//! Field and method descriptor grammar: `(param*)return`, primitive letters
//! `B C D F I J S Z`, object `L<name>;`, array `[<type>`, void return `V`.

use std::fmt;
use std::io::{self, Error, ErrorKind};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDescriptor {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldDescriptor>),
    Void,
    Method {
        args: Vec<FieldDescriptor>,
        returns: Box<FieldDescriptor>,
    },
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDescriptor::Byte => write!(f, "B"),
            FieldDescriptor::Char => write!(f, "C"),
            FieldDescriptor::Double => write!(f, "D"),
            FieldDescriptor::Float => write!(f, "F"),
            FieldDescriptor::Int => write!(f, "I"),
            FieldDescriptor::Long => write!(f, "J"),
            FieldDescriptor::Short => write!(f, "S"),
            FieldDescriptor::Boolean => write!(f, "Z"),
            FieldDescriptor::Object(name) => write!(f, "L{};", name),
            FieldDescriptor::Array(inner) => write!(f, "[{}", inner),
            FieldDescriptor::Void => write!(f, "V"),
            FieldDescriptor::Method { args, returns } => {
                write!(f, "(")?;
                for arg in args {
                    write!(f, "{}", arg)?;
                }
                write!(f, "){}", returns)
            }
        }
    }
}

impl FieldDescriptor {
    /// Number of operand-stack/local-variable slots this type occupies. Category-2
    /// values (long/double) are collapsed to a single slot (category-2 simplification).
    pub fn word_len(&self) -> usize {
        1
    }

    pub fn is_object_like(&self) -> bool {
        matches!(self, FieldDescriptor::Object(_) | FieldDescriptor::Array(_))
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, FieldDescriptor::Long | FieldDescriptor::Double)
    }

    /// The descriptor-typed zero value for a field that has never been written.
    pub fn initial_value(&self) -> Value {
        match self {
            FieldDescriptor::Byte
            | FieldDescriptor::Char
            | FieldDescriptor::Int
            | FieldDescriptor::Short
            | FieldDescriptor::Boolean => Value::Int(0),
            FieldDescriptor::Double => Value::Double(0.0),
            FieldDescriptor::Float => Value::Float(0.0),
            FieldDescriptor::Long => Value::Long(0),
            FieldDescriptor::Object(_) | FieldDescriptor::Array(_) => Value::null(),
            FieldDescriptor::Void => Value::null(),
            FieldDescriptor::Method { .. } => Value::null(),
        }
    }

    /// Parses a single field-type descriptor (no enclosing method parens).
    pub fn parse(text: &str) -> io::Result<Self> {
        let bytes = text.as_bytes();
        let mut pos = 0;
        let desc = Self::parse_type_at(bytes, &mut pos)?;
        Ok(desc)
    }

    /// Parses a full method descriptor `(args)return`, counting one parameter per
    /// primitive letter, per `L...;`, or per `[...`.
    pub fn parse_method(text: &str) -> io::Result<Self> {
        let bytes = text.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(bad_descriptor(text));
        }
        let mut pos = 1;
        let mut args = Vec::new();
        while bytes.get(pos) != Some(&b')') {
            if pos >= bytes.len() {
                return Err(bad_descriptor(text));
            }
            args.push(Self::parse_type_at(bytes, &mut pos)?);
        }
        pos += 1; // skip ')'
        let returns = Box::new(Self::parse_type_at(bytes, &mut pos)?);
        if pos != bytes.len() {
            return Err(bad_descriptor(text));
        }
        Ok(FieldDescriptor::Method { args, returns })
    }

    fn parse_type_at(bytes: &[u8], pos: &mut usize) -> io::Result<Self> {
        if *pos >= bytes.len() {
            return Err(Error::new(ErrorKind::InvalidData, "descriptor ended early"));
        }
        let tag = bytes[*pos];
        *pos += 1;
        Ok(match tag {
            b'B' => FieldDescriptor::Byte,
            b'C' => FieldDescriptor::Char,
            b'D' => FieldDescriptor::Double,
            b'F' => FieldDescriptor::Float,
            b'I' => FieldDescriptor::Int,
            b'J' => FieldDescriptor::Long,
            b'S' => FieldDescriptor::Short,
            b'Z' => FieldDescriptor::Boolean,
            b'V' => FieldDescriptor::Void,
            b'[' => FieldDescriptor::Array(Box::new(Self::parse_type_at(bytes, pos)?)),
            b'L' => {
                let start = *pos;
                while bytes.get(*pos) != Some(&b';') {
                    if *pos >= bytes.len() {
                        return Err(Error::new(ErrorKind::InvalidData, "unterminated object descriptor"));
                    }
                    *pos += 1;
                }
                let name = String::from_utf8_lossy(&bytes[start..*pos]).into_owned();
                *pos += 1; // skip ';'
                FieldDescriptor::Object(name)
            }
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid descriptor tag '{}'", other as char),
                ))
            }
        })
    }
}

fn bad_descriptor(text: &str) -> Error {
    Error::new(ErrorKind::InvalidData, format!("malformed method descriptor: {}", text))
}

/// Counts the argument slots a method descriptor consumes off the operand stack,
/// per the category-2 single-slot simplification (§3).
pub fn arg_slot_count(method: &FieldDescriptor) -> usize {
    match method {
        FieldDescriptor::Method { args, .. } => args.iter().map(|a| a.word_len()).sum(),
        _ => 0,
    }
}

pub fn returns_void(method: &FieldDescriptor) -> bool {
    matches!(method, FieldDescriptor::Method { returns, .. } if matches!(**returns, FieldDescriptor::Void))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive() {
        assert_eq!(FieldDescriptor::parse("I").unwrap(), FieldDescriptor::Int);
        assert_eq!(FieldDescriptor::parse("D").unwrap(), FieldDescriptor::Double);
    }

    #[test]
    fn parses_object_and_array() {
        assert_eq!(
            FieldDescriptor::parse("Ljava/lang/String;").unwrap(),
            FieldDescriptor::Object("java/lang/String".to_string())
        );
        assert_eq!(
            FieldDescriptor::parse("[[I").unwrap(),
            FieldDescriptor::Array(Box::new(FieldDescriptor::Array(Box::new(FieldDescriptor::Int))))
        );
    }

    #[test]
    fn parses_method_descriptor_arg_count() {
        let desc = FieldDescriptor::parse_method("(ILjava/lang/String;[I)V").unwrap();
        assert_eq!(arg_slot_count(&desc), 3);
        assert!(returns_void(&desc));
    }

    #[test]
    fn parses_main_descriptor() {
        let desc = FieldDescriptor::parse_method("([Ljava/lang/String;)V").unwrap();
        assert_eq!(arg_slot_count(&desc), 1);
    }
}
