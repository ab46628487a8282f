//! # efixray-analysis
//!
//! Protocol interface type recovery for decompiled UEFI firmware.
//!
//! This crate provides:
//! - A model of decompiled functions (expressions, structured bodies, locals)
//! - Catalogs of protocol-returning boot and SMM service entry points
//! - Protocol GUID registry and usage records
//! - The GUID retyping pass and the driver running it over usage records
//! - Project persistence for the resulting variable types
//!
//! # Example
//!
//! ```ignore
//! use efixray_analysis::efi::{retype_all, ProtocolRegistry, ProtocolUsageRecord, RetypeConfig};
//! use efixray_analysis::project::AnalysisProject;
//! use efixray_types::{builtin, TypeDatabase};
//!
//! let mut types = TypeDatabase::new();
//! builtin::load_uefi_types(&mut types);
//! let records = ProtocolUsageRecord::load_file("protocols.json")?;
//!
//! let mut project = AnalysisProject::new("DxeCore.efi");
//! let report = retype_all(
//!     &program,
//!     &types,
//!     &ProtocolRegistry::builtin(),
//!     &records,
//!     &mut project,
//!     RetypeConfig::new(),
//! );
//! println!("{} variables retyped", report.stats.retyped);
//! ```

pub mod decompiler;
pub mod efi;
pub mod error;
pub mod project;

pub use decompiler::{
    BinaryDataContext, DecompiledFunction, DecompiledProgram, FunctionSource, LocalVariable,
};
pub use efi::{
    retype_all, Driver, GuidRetyper, ProtocolRegistry, ProtocolUsageRecord, RetypeConfig,
    RetypeReport, ServiceTableRegistry, VariableStore,
};
pub use error::{Error, Result};
pub use project::{AnalysisProject, ProjectError, ProjectResult};
