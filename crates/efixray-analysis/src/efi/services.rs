//! Service-table call catalog.
//!
//! A [`CallDescriptor`] names one protocol-returning entry point of a
//! firmware service table: where its function pointer sits in the table,
//! how many arguments it takes, and which of them carry the protocol GUID
//! and the output interface pointer. Descriptors are grouped into
//! [`ServiceTable`]s, which are collected into a [`ServiceTableRegistry`]
//! built once before any traversal and read-only afterwards.

use efixray_types::builtin::{BOOT_SERVICES_TYPE, SMM_SYSTEM_TABLE_TYPE};
use efixray_types::{LayoutError, TypeDatabase};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors building a catalog at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{name}: argument index {index} out of range for {arg_count} arguments")]
    IndexOutOfRange {
        name: &'static str,
        index: u32,
        arg_count: u32,
    },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// One protocol-returning service entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDescriptor {
    pub name: &'static str,
    /// Byte offset of the function pointer within the service table.
    pub table_offset: u32,
    pub arg_count: u32,
    pub guid_arg_index: u32,
    pub interface_arg_index: u32,
    /// Pointer levels between the interface argument's storage and the
    /// interface structure, as seen by an array-shaped destination.
    pub dest_pointer_depth: u32,
}

impl CallDescriptor {
    /// Creates a descriptor.
    ///
    /// # Panics
    ///
    /// Panics if either argument index is not below `arg_count`. In a const
    /// context this is a compile error.
    pub const fn new(
        name: &'static str,
        table_offset: u32,
        arg_count: u32,
        guid_arg_index: u32,
        interface_arg_index: u32,
        dest_pointer_depth: u32,
    ) -> Self {
        assert!(guid_arg_index < arg_count, "GUID argument index out of range");
        assert!(interface_arg_index < arg_count, "interface argument index out of range");
        Self {
            name,
            table_offset,
            arg_count,
            guid_arg_index,
            interface_arg_index,
            dest_pointer_depth,
        }
    }

    /// Creates a descriptor, rejecting out-of-range argument indices.
    pub fn try_new(
        name: &'static str,
        table_offset: u32,
        arg_count: u32,
        guid_arg_index: u32,
        interface_arg_index: u32,
        dest_pointer_depth: u32,
    ) -> Result<Self, CatalogError> {
        for index in [guid_arg_index, interface_arg_index] {
            if index >= arg_count {
                return Err(CatalogError::IndexOutOfRange {
                    name,
                    index,
                    arg_count,
                });
            }
        }
        Ok(Self {
            name,
            table_offset,
            arg_count,
            guid_arg_index,
            interface_arg_index,
            dest_pointer_depth,
        })
    }

    /// Whether the argument indices are in range.
    pub fn is_well_formed(&self) -> bool {
        self.guid_arg_index < self.arg_count && self.interface_arg_index < self.arg_count
    }
}

/// A descriptor whose table offset comes from the table's type layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSpec {
    /// Name of the function pointer member in the table structure.
    pub field: &'static str,
    pub arg_count: u32,
    pub guid_arg_index: u32,
    pub interface_arg_index: u32,
    pub dest_pointer_depth: u32,
}

/// Which firmware service table a catalog describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceTableKind {
    /// `EFI_BOOT_SERVICES`.
    BootServices,
    /// `_EFI_SMM_SYSTEM_TABLE2`.
    SmmServices,
}

impl ServiceTableKind {
    pub fn all() -> &'static [ServiceTableKind] {
        &[ServiceTableKind::BootServices, ServiceTableKind::SmmServices]
    }

    /// Parses a table kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bs" | "boot" | "boot_services" | "efi_boot_services" => Some(Self::BootServices),
            "smm" | "smst" | "smm_services" | "_efi_smm_system_table2" | "efi_smm_system_table2" => {
                Some(Self::SmmServices)
            }
            _ => None,
        }
    }

    /// Registered name of the table's structure type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::BootServices => BOOT_SERVICES_TYPE,
            Self::SmmServices => SMM_SYSTEM_TABLE_TYPE,
        }
    }

    /// The builtin catalog for this table.
    pub fn catalog(&self) -> ServiceTable {
        match self {
            Self::BootServices => ServiceTable::boot_services(),
            Self::SmmServices => ServiceTable::smm_services(),
        }
    }
}

impl fmt::Display for ServiceTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootServices => f.write_str("boot services"),
            Self::SmmServices => f.write_str("SMM services"),
        }
    }
}

/// `EFI_BOOT_SERVICES` entries that hand out protocol interfaces.
pub const BOOT_SERVICES_CALLS: [CallDescriptor; 3] = [
    CallDescriptor::new("HandleProtocol", 0x98, 3, 1, 2, 1),
    CallDescriptor::new("LocateProtocol", 0x140, 3, 0, 2, 1),
    CallDescriptor::new("OpenProtocol", 0x118, 6, 1, 2, 2),
];

/// `_EFI_SMM_SYSTEM_TABLE2` entries that hand out protocol interfaces.
pub const SMM_SERVICES_CALLS: [CallDescriptor; 2] = [
    CallDescriptor::new("SmmHandleProtocol", 0xb8, 3, 1, 2, 1),
    CallDescriptor::new("SmmLocateProtocol", 0xd0, 3, 0, 2, 1),
];

/// Layout-relative form of [`BOOT_SERVICES_CALLS`].
pub const BOOT_SERVICES_SPECS: [DescriptorSpec; 3] = [
    DescriptorSpec {
        field: "HandleProtocol",
        arg_count: 3,
        guid_arg_index: 1,
        interface_arg_index: 2,
        dest_pointer_depth: 1,
    },
    DescriptorSpec {
        field: "LocateProtocol",
        arg_count: 3,
        guid_arg_index: 0,
        interface_arg_index: 2,
        dest_pointer_depth: 1,
    },
    DescriptorSpec {
        field: "OpenProtocol",
        arg_count: 6,
        guid_arg_index: 1,
        interface_arg_index: 2,
        dest_pointer_depth: 2,
    },
];

/// Layout-relative form of [`SMM_SERVICES_CALLS`].
pub const SMM_SERVICES_SPECS: [DescriptorSpec; 2] = [
    DescriptorSpec {
        field: "SmmHandleProtocol",
        arg_count: 3,
        guid_arg_index: 1,
        interface_arg_index: 2,
        dest_pointer_depth: 1,
    },
    DescriptorSpec {
        field: "SmmLocateProtocol",
        arg_count: 3,
        guid_arg_index: 0,
        interface_arg_index: 2,
        dest_pointer_depth: 1,
    },
];

/// The protocol-returning entries of one service table structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTable {
    /// Registered name of the table's structure type.
    pub name: String,
    entries: Vec<CallDescriptor>,
}

impl ServiceTable {
    /// Builds a table from a fixed descriptor array.
    pub fn initialize(name: impl Into<String>, descriptors: &[CallDescriptor]) -> Self {
        Self {
            name: name.into(),
            entries: descriptors.to_vec(),
        }
    }

    /// Builds a table whose offsets are read from the registered layout of
    /// the `name` structure.
    pub fn from_layout(
        db: &TypeDatabase,
        name: &str,
        specs: &[DescriptorSpec],
    ) -> Result<Self, CatalogError> {
        let entries = specs
            .iter()
            .map(|spec| {
                let offset = db.offset_of(name, spec.field)?;
                CallDescriptor::try_new(
                    spec.field,
                    offset,
                    spec.arg_count,
                    spec.guid_arg_index,
                    spec.interface_arg_index,
                    spec.dest_pointer_depth,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            entries,
        })
    }

    /// The builtin x64 boot services catalog.
    pub fn boot_services() -> Self {
        Self::initialize(BOOT_SERVICES_TYPE, &BOOT_SERVICES_CALLS)
    }

    /// The builtin x64 SMM system table catalog.
    pub fn smm_services() -> Self {
        Self::initialize(SMM_SYSTEM_TABLE_TYPE, &SMM_SERVICES_CALLS)
    }

    pub fn entries(&self) -> &[CallDescriptor] {
        &self.entries
    }

    /// The descriptor whose function pointer sits at `offset`.
    pub fn find_by_offset(&self, offset: u32) -> Option<&CallDescriptor> {
        self.entries.iter().find(|d| d.table_offset == offset)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&CallDescriptor> {
        self.entries.iter().find(|d| d.name == name)
    }
}

/// Service tables keyed by structure type name.
#[derive(Debug, Clone, Default)]
pub struct ServiceTableRegistry {
    tables: BTreeMap<String, Arc<ServiceTable>>,
}

impl ServiceTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin boot services and SMM catalogs.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in ServiceTableKind::all() {
            registry.register(kind.catalog());
        }
        registry
    }

    /// Registry whose catalogs take their offsets from `db`.
    pub fn from_layouts(db: &TypeDatabase) -> Result<Self, CatalogError> {
        let mut registry = Self::new();
        registry.register(ServiceTable::from_layout(db, BOOT_SERVICES_TYPE, &BOOT_SERVICES_SPECS)?);
        registry.register(ServiceTable::from_layout(db, SMM_SYSTEM_TABLE_TYPE, &SMM_SERVICES_SPECS)?);
        Ok(registry)
    }

    /// Inserts a table, replacing any table of the same name.
    pub fn register(&mut self, table: ServiceTable) {
        self.tables.insert(table.name.clone(), Arc::new(table));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceTable>> {
        self.tables.get(name)
    }

    pub fn get_kind(&self, kind: ServiceTableKind) -> Option<&Arc<ServiceTable>> {
        self.get(kind.type_name())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<ServiceTable>> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
