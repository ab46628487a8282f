//! Field layout queries against the type database.

use crate::database::TypeDatabase;
use crate::types::CType;
use thiserror::Error;

/// Errors from layout queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The type has no retrievable member layout.
    #[error("could not retrieve member layout for {type_name}")]
    NoLayout { type_name: String },

    /// The type has a layout but no member by that name.
    #[error("could not find member {type_name}::{field}")]
    FieldNotFound { type_name: String, field: String },
}

impl TypeDatabase {
    /// Byte offset of `field` inside the struct or union `ty`.
    ///
    /// Member offsets are stored in bits; the result is shifted down by 3.
    /// Union members all sit at offset 0.
    pub fn offset_of_field(&self, ty: &CType, field: &str) -> Result<u32, LayoutError> {
        let type_name = || ty.type_name().map(str::to_string).unwrap_or_else(|| ty.to_string());

        match self.resolve(ty) {
            Some(CType::Struct(st)) => st
                .field_by_name(field)
                .map(|f| (f.offset_bits >> 3) as u32)
                .ok_or_else(|| LayoutError::FieldNotFound {
                    type_name: type_name(),
                    field: field.to_string(),
                }),
            Some(CType::Union(un)) => un
                .members
                .iter()
                .any(|m| m.name == field)
                .then_some(0)
                .ok_or_else(|| LayoutError::FieldNotFound {
                    type_name: type_name(),
                    field: field.to_string(),
                }),
            _ => Err(LayoutError::NoLayout {
                type_name: type_name(),
            }),
        }
    }

    /// Byte offset of a field in a type registered under `type_name`.
    pub fn offset_of(&self, type_name: &str, field: &str) -> Result<u32, LayoutError> {
        self.offset_of_field(&CType::named(type_name), field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StructType, UnionType};

    fn db_with_bits() -> TypeDatabase {
        let mut st = StructType::new(Some("HEADER".to_string()));
        st.add_field_at_bits("Signature", CType::ulonglong(), 0);
        st.add_field_at_bits("Revision", CType::uint(), 64);
        st.add_field_at_bits("HeaderSize", CType::uint(), 96);

        let mut un = UnionType::new(Some("VALUE".to_string()));
        un.add_member("AsU32", CType::uint());
        un.add_member("AsU64", CType::ulonglong());

        let mut db = TypeDatabase::new();
        db.add_type("HEADER", CType::Struct(st));
        db.add_type("VALUE", CType::Union(un));
        db.add_typedef("PHEADER_ALIAS", CType::named("HEADER"));
        db.add_typedef("UINT32", CType::uint());
        db
    }

    #[test]
    fn test_offset_is_bits_shifted() {
        let db = db_with_bits();
        assert_eq!(db.offset_of("HEADER", "Signature"), Ok(0));
        assert_eq!(db.offset_of("HEADER", "Revision"), Ok(8));
        assert_eq!(db.offset_of("HEADER", "HeaderSize"), Ok(12));
    }

    #[test]
    fn test_offset_through_typedef() {
        let db = db_with_bits();
        assert_eq!(db.offset_of("PHEADER_ALIAS", "HeaderSize"), Ok(12));
    }

    #[test]
    fn test_union_members_at_zero() {
        let db = db_with_bits();
        assert_eq!(db.offset_of("VALUE", "AsU64"), Ok(0));
        assert!(matches!(
            db.offset_of("VALUE", "AsU16"),
            Err(LayoutError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_field() {
        let db = db_with_bits();
        assert_eq!(
            db.offset_of("HEADER", "Crc32"),
            Err(LayoutError::FieldNotFound {
                type_name: "HEADER".to_string(),
                field: "Crc32".to_string(),
            })
        );
    }

    #[test]
    fn test_no_layout() {
        let db = db_with_bits();
        assert!(matches!(
            db.offset_of("UINT32", "x"),
            Err(LayoutError::NoLayout { .. })
        ));
        assert!(matches!(
            db.offset_of("NOT_REGISTERED", "x"),
            Err(LayoutError::NoLayout { type_name }) if type_name == "NOT_REGISTERED"
        ));
    }
}
