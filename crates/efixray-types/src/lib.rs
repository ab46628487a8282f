//! # efixray-types
//!
//! C type library for the efixray firmware analyzer.
//!
//! This crate provides:
//! - C type representation (structs, unions, enums, typedefs, functions)
//! - Type database for looking up, resolving and sizing types by name
//! - Field layout queries (byte offset of a named member)
//! - Scalar and plain-old-data array classification
//! - Builtin UEFI types (service tables, protocol interfaces)
//!
//! # Example
//!
//! ```ignore
//! use efixray_types::{builtin, CType, TypeDatabase};
//!
//! let mut db = TypeDatabase::new();
//! builtin::load_uefi_types(&mut db);
//!
//! // Offset of a boot service slot
//! let off = db.offset_of("EFI_BOOT_SERVICES", "LocateProtocol")?;
//! assert_eq!(off, 0x140);
//!
//! // Is a local declared as UINT8[16] a plain array?
//! let buf = CType::array(CType::named("UINT8"), Some(16));
//! assert!(db.is_pod_array(&buf, 0));
//! ```

pub mod builtin;
pub mod classify;
pub mod database;
pub mod layout;
pub mod types;

pub use classify::{ScalarClass, ScalarRule};
pub use database::{ArchInfo, TypeDatabase};
pub use layout::LayoutError;
pub use types::*;
