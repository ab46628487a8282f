//! Error types for efixray-analysis.
//!
//! Every variant is local to one call site, function or usage record. The
//! retyper and driver report them and move on; none aborts a batch.

use efixray_types::LayoutError;
use thiserror::Error;
use uguid::Guid;

/// Analysis error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A type layout query failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The GUID argument is not a compile-time constant reference.
    #[error("GUID argument at {site:#x} is not a constant: {expr}")]
    UnresolvedGuid { site: u64, expr: String },

    /// No protocol is known for the GUID at this call site.
    #[error("unknown protocol {guid} at {site:#x}")]
    UnknownProtocol { site: u64, guid: Guid },

    /// The protocol's interface structure is not in the type database.
    #[error("interface type {type_name} for {protocol} is not registered")]
    UnknownInterfaceType { protocol: String, type_name: String },

    /// The interface argument is not one of the recognized destination shapes.
    #[error("unsupported destination shape at {site:#x}: {expr}")]
    UnsupportedDestinationShape { site: u64, expr: String },

    /// The variable metadata store rejected a type change.
    #[error("failed to set type of {variable} in function {function:#x}")]
    Retype { function: u64, variable: String },

    /// The host could not decompile the function.
    #[error("decompilation of function {function:#x} failed: {reason}")]
    DecompilationFailed { function: u64, reason: String },

    /// No function contains the address.
    #[error("no function contains address {0:#x}")]
    FunctionNotFound(u64),
}

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, Error>;
