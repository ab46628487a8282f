//! Type database for storing and looking up types.
//!
//! The TypeDatabase stores named types and typedefs, resolves named
//! references, sizes types for the configured architecture and derives
//! pointer/array types from registered ones.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on typedef/named hops while resolving a type.
const MAX_RESOLVE_DEPTH: usize = 32;

/// A database of C types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDatabase {
    /// Named types (structs, unions, enums).
    types: HashMap<String, CType>,

    /// Typedefs.
    typedefs: HashMap<String, CType>,

    /// Architecture info for size calculations.
    #[serde(skip)]
    arch: ArchInfo,
}

/// Architecture information for type sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchInfo {
    /// Pointer size in bytes.
    pub pointer_size: usize,
}

impl Default for ArchInfo {
    fn default() -> Self {
        Self::llp64()
    }
}

impl ArchInfo {
    /// LLP64 model (UEFI x64, Windows 64-bit).
    pub fn llp64() -> Self {
        Self { pointer_size: 8 }
    }
}

impl TypeDatabase {
    /// Create a new empty type database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with specific architecture info.
    pub fn with_arch(arch: ArchInfo) -> Self {
        Self {
            arch,
            ..Default::default()
        }
    }

    pub fn arch(&self) -> &ArchInfo {
        &self.arch
    }

    // ==================== Type Management ====================

    /// Add a named type (struct, union, enum).
    pub fn add_type(&mut self, name: impl Into<String>, ty: CType) {
        self.types.insert(name.into(), ty);
    }

    /// Add a typedef.
    pub fn add_typedef(&mut self, name: impl Into<String>, target: CType) {
        self.typedefs.insert(name.into(), target);
    }

    /// Lay out and register a struct whose field sizes come from this database.
    ///
    /// Named field types are sized through `size_of`, so layouts built from
    /// typedef names get the same offsets a compiler for `arch` would give.
    pub fn add_struct(&mut self, name: &str, fields: Vec<(&str, CType)>) -> &CType {
        let mut st = StructType::new(Some(name.to_string()));
        for (field_name, ty) in fields {
            let size = self.size_of(&ty).unwrap_or(0);
            let align = self.align_of(&ty).unwrap_or(1);
            st.add_sized_field(field_name, ty, size, align);
        }
        st.finalize();
        self.types.insert(name.to_string(), CType::Struct(st));
        &self.types[name]
    }

    /// Get a type by name.
    pub fn get_type(&self, name: &str) -> Option<&CType> {
        if let Some(ty) = self.types.get(name) {
            return Some(ty);
        }
        if let Some(ty) = self.typedefs.get(name) {
            return Some(ty);
        }
        for prefix in ["struct", "union", "enum"] {
            if let Some(ty) = self.types.get(&format!("{} {}", prefix, name)) {
                return Some(ty);
            }
        }
        None
    }

    /// Check if a type exists.
    pub fn has_type(&self, name: &str) -> bool {
        self.get_type(name).is_some()
    }

    // ==================== Resolution ====================

    /// Follow typedefs and named references down to a concrete type.
    ///
    /// Returns None when a name along the way is not registered.
    pub fn resolve<'a>(&'a self, ty: &'a CType) -> Option<&'a CType> {
        let mut current = ty;
        for _ in 0..MAX_RESOLVE_DEPTH {
            current = match current {
                CType::Typedef(t) => &t.target,
                CType::Named(name) => self.get_type(name)?,
                other => return Some(other),
            };
        }
        None
    }

    /// Size of a type in bytes for the configured architecture.
    pub fn size_of(&self, ty: &CType) -> Option<usize> {
        match self.resolve(ty)? {
            CType::Pointer(_) => Some(self.arch.pointer_size),
            CType::Array(a) => Some(self.size_of(&a.element)? * a.length?),
            other => other.size(),
        }
    }

    /// Alignment of a type in bytes for the configured architecture.
    pub fn align_of(&self, ty: &CType) -> Option<usize> {
        match self.resolve(ty)? {
            CType::Pointer(_) => Some(self.arch.pointer_size),
            CType::Array(a) => self.align_of(&a.element),
            other => other.alignment(),
        }
    }

    /// Derive a pointer to `ty`. The base definition is left untouched.
    pub fn pointer_to(&self, ty: &CType) -> CType {
        CType::ptr(ty.clone())
    }

    /// Derive an array of `count` elements of `ty`.
    pub fn array_of(&self, ty: &CType, count: Option<usize>) -> CType {
        CType::array(ty.clone(), count)
    }

    // ==================== Serialization ====================

    /// Save database to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load database from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_db() -> TypeDatabase {
        let mut db = TypeDatabase::new();
        db.add_typedef("UINT32", CType::uint());
        db.add_typedef("UINTN", CType::ulonglong());
        db.add_typedef("EFI_HANDLE", CType::ptr(CType::void()));
        db.add_struct(
            "SAMPLE",
            vec![
                ("Revision", CType::named("UINT32")),
                ("Handle", CType::named("EFI_HANDLE")),
                ("Count", CType::named("UINTN")),
            ],
        );
        db
    }

    #[test]
    fn test_add_and_get_type() {
        let mut db = TypeDatabase::new();
        db.add_type(
            "struct point",
            CType::Struct(StructType::new(Some("point".to_string()))),
        );

        assert!(db.has_type("struct point"));
        assert!(db.has_type("point"));
        assert!(!db.has_type("line"));
    }

    #[test]
    fn test_resolve_through_names() {
        let mut db = sample_db();
        db.add_typedef("EFI_STATUS", CType::named("UINTN"));

        assert_eq!(db.resolve(&CType::named("EFI_STATUS")), Some(&CType::ulonglong()));
        assert_eq!(
            db.resolve(&CType::typedef("BOOLEAN", CType::uchar())),
            Some(&CType::uchar())
        );
        assert!(db.resolve(&CType::named("MISSING")).is_none());
    }

    #[test]
    fn test_resolve_cycle_terminates() {
        let mut db = TypeDatabase::new();
        db.add_typedef("A", CType::named("B"));
        db.add_typedef("B", CType::named("A"));
        assert!(db.resolve(&CType::named("A")).is_none());
    }

    #[test]
    fn test_add_struct_uses_named_sizes() {
        let db = sample_db();
        let CType::Struct(st) = db.get_type("SAMPLE").unwrap() else {
            panic!("expected struct");
        };
        assert_eq!(st.fields[0].byte_offset(), 0);
        assert_eq!(st.fields[1].byte_offset(), 8);
        assert_eq!(st.fields[2].byte_offset(), 16);
        assert_eq!(st.size, 24);
    }

    #[test]
    fn test_size_of_follows_arch() {
        let mut db = TypeDatabase::with_arch(ArchInfo { pointer_size: 4 });
        db.add_typedef("EFI_HANDLE", CType::ptr(CType::void()));
        assert_eq!(db.size_of(&CType::named("EFI_HANDLE")), Some(4));
        assert_eq!(
            db.size_of(&CType::array(CType::named("EFI_HANDLE"), Some(3))),
            Some(12)
        );
    }

    #[test]
    fn test_derived_types_leave_base_untouched() {
        let db = sample_db();
        let base = db.get_type("SAMPLE").unwrap().clone();
        let ptr = db.pointer_to(&CType::named("SAMPLE"));
        let arr = db.array_of(&ptr, Some(2));

        assert_eq!(ptr, CType::ptr(CType::named("SAMPLE")));
        assert_eq!(arr.array_parts().map(|(_, n)| n), Some(Some(2)));
        assert_eq!(db.get_type("SAMPLE"), Some(&base));
    }

    #[test]
    fn test_json_roundtrip() {
        let db = sample_db();
        let json = db.to_json().unwrap();
        let db2 = TypeDatabase::from_json(&json).unwrap();

        assert!(db2.has_type("SAMPLE"));
        assert_eq!(db2.get_type("UINTN"), Some(&CType::ulonglong()));
    }
}
