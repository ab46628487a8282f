//! Protocol interface retyping for UEFI firmware.
//!
//! Calls such as `gBS->LocateProtocol(&Guid, NULL, &Interface)` hand back
//! an untyped interface pointer. This module matches those calls against a
//! catalog of service table entry points, resolves the GUID to a protocol,
//! and gives the receiving variable the protocol's interface type.

pub mod config;
pub mod driver;
pub mod protocols;
pub mod report;
pub mod retyper;
pub mod services;
pub mod typer;

pub use config::RetypeConfig;
pub use driver::{retype_all, Driver};
pub use protocols::{
    interface_type_for, ProtocolError, ProtocolRegistry, ProtocolRegistryEntry,
    ProtocolUsageRecord,
};
pub use report::{RetypeReport, RetypeStats, SiteOutcome, SiteReport};
pub use retyper::{AnalysisContext, DestinationShape, GuidRetyper};
pub use services::{
    CallDescriptor, CatalogError, DescriptorSpec, ServiceTable, ServiceTableKind,
    ServiceTableRegistry,
};
pub use typer::{VariableStore, VariableTyper};
