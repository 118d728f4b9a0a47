//! Two-tier class loader hierarchy (§4.2): a bootstrap loader reading a compressed
//! module archive, and a directory loader that delegates to it first. Repeated loads of
//! the same name return the identical cached `ClassRef` (cache-hit identity is
//! testable, §8).

use hashbrown::HashMap;
use std::cell::RefCell;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::rc::Rc;
use zip::ZipArchive;

use crate::class::Class;
use crate::error::VmError;
use crate::read::Readable;

pub type ClassRef = Rc<Class>;

/// A zip archive preceded by a 4-byte header that must be skipped before zip parsing
/// (§6). Opened once; subsequent `load` calls serve from an in-memory cache, matching
/// the "memory-resident for the VM's lifetime" contract.
pub struct ModuleArchiveLoader {
    archive: RefCell<ZipArchive<Cursor<Vec<u8>>>>,
    cache: RefCell<HashMap<String, ClassRef>>,
}

impl ModuleArchiveLoader {
    pub fn open(bytes: Vec<u8>) -> Result<Self, VmError> {
        if bytes.len() < 4 {
            return Err(VmError::Format("module archive too short for header".into()));
        }
        let archive = ZipArchive::new(Cursor::new(bytes[4..].to_vec()))
            .map_err(|e| VmError::Format(format!("module archive is not a valid zip: {}", e)))?;
        Ok(ModuleArchiveLoader { archive: RefCell::new(archive), cache: RefCell::new(HashMap::new()) })
    }

    pub fn load(&self, name: &str) -> Result<Option<ClassRef>, VmError> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(Some(cached.clone()));
        }

        let entry_name = format!("classes/{}.class", name);
        let mut archive = self.archive.borrow_mut();
        let mut entry = match archive.by_name(&entry_name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(VmError::Format(format!("module archive read error: {}", e))),
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes).map_err(VmError::Io)?;
        drop(entry);
        drop(archive);

        let class = Class::read(&mut Cursor::new(bytes)).map_err(VmError::Io)?;
        let class_ref = Rc::new(class);
        self.cache.borrow_mut().insert(name.to_string(), class_ref.clone());
        Ok(Some(class_ref))
    }
}

/// Delegates to the bootstrap loader, then falls back to `<classpath>/<name>.class` on
/// disk. Caches are keyed by fully-qualified slash-separated name.
pub struct ClassLoader {
    bootstrap: ModuleArchiveLoader,
    classpath: PathBuf,
    cache: RefCell<HashMap<String, ClassRef>>,
}

impl ClassLoader {
    pub fn new(bootstrap: ModuleArchiveLoader, classpath: PathBuf) -> Self {
        ClassLoader { bootstrap, classpath, cache: RefCell::new(HashMap::new()) }
    }

    pub fn load(&self, name: &str) -> Result<ClassRef, VmError> {
        if let Some(cached) = self.cache.borrow().get(name) {
            return Ok(cached.clone());
        }

        if let Some(class) = self.bootstrap.load(name)? {
            self.cache.borrow_mut().insert(name.to_string(), class.clone());
            return Ok(class);
        }

        let path = self.classpath.join(format!("{}.class", name));
        let bytes = std::fs::read(&path).map_err(|_| VmError::ClassNotFound(name.to_string()))?;
        let class = Class::read(&mut Cursor::new(bytes)).map_err(VmError::Io)?;
        let class_ref = Rc::new(class);
        self.cache.borrow_mut().insert(name.to_string(), class_ref.clone());
        Ok(class_ref)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cache.borrow().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip_with_header(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0, 0, 0, 0]); // 4-byte module-archive header
        let cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(cursor);
        for (name, data) in entries {
            writer.start_file(*name, zip::write::FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        let cursor = writer.finish().unwrap();
        out.extend_from_slice(cursor.get_ref());
        out
    }

    #[test]
    fn repeated_loads_return_identical_cached_object() {
        // A minimal well-formed class: java/lang/Object with no fields/methods.
        let class_bytes = minimal_object_class_bytes();
        let archive_bytes = write_zip_with_header(&[("classes/java/lang/Object.class", &class_bytes)]);
        let loader = ModuleArchiveLoader::open(archive_bytes).unwrap();

        let first = loader.load("java/lang/Object").unwrap().unwrap();
        let second = loader.load("java/lang/Object").unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    fn minimal_object_class_bytes() -> Vec<u8> {
        // magic, minor, major, constant_pool_count=2 [1: Utf8 "java/lang/Object" is
        // unused directly; we build the simplest valid pool referencing this_class].
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes()); // minor
        bytes.extend_from_slice(&52u16.to_be_bytes()); // major
        bytes.extend_from_slice(&3u16.to_be_bytes()); // constant_pool_count (2 entries + implicit 0)
        bytes.push(1); // Utf8
        let name = b"java/lang/Object";
        bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
        bytes.extend_from_slice(name);
        bytes.push(7); // Class
        bytes.extend_from_slice(&1u16.to_be_bytes()); // name_index -> #1
        bytes.extend_from_slice(&0u16.to_be_bytes()); // access_flags
        bytes.extend_from_slice(&2u16.to_be_bytes()); // this_class -> #2
        bytes.extend_from_slice(&0u16.to_be_bytes()); // super_class = 0
        bytes.extend_from_slice(&0u16.to_be_bytes()); // interfaces_count
        bytes.extend_from_slice(&0u16.to_be_bytes()); // fields_count
        bytes.extend_from_slice(&0u16.to_be_bytes()); // methods_count
        bytes.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
        bytes
    }
}
