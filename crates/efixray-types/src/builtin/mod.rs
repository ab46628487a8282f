//! Builtin type definitions.
//!
//! This module provides pre-defined types for UEFI firmware images:
//! base typedefs, the boot and SMM service tables, and the interface
//! structures of commonly located protocols.

pub mod uefi;

pub use uefi::{load_uefi_types, BOOT_SERVICES_TYPE, SMM_SYSTEM_TABLE_TYPE};
