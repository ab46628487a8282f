//! Protocol GUID registry and protocol usage records.
//!
//! The registry maps a protocol GUID to the protocol's name and the name
//! of its interface structure. Usage records describe call sites found
//! upstream that plausibly obtain a protocol interface; the driver walks
//! them one by one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use uguid::{guid, Guid};

/// Errors loading registry or usage-record data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Interface structure name implied by a protocol name.
///
/// `EFI_LOADED_IMAGE_PROTOCOL_GUID` names the `EFI_LOADED_IMAGE_PROTOCOL`
/// structure; names without the suffix are used as they are.
pub fn interface_type_for(protocol_name: &str) -> &str {
    protocol_name
        .strip_suffix("_GUID")
        .unwrap_or(protocol_name)
}

/// A known protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRegistryEntry {
    pub guid: Guid,
    #[serde(alias = "name", alias = "prot_name")]
    pub protocol_name: String,
    #[serde(default)]
    pub interface_type_name: String,
}

impl ProtocolRegistryEntry {
    /// Creates an entry whose interface type follows from the protocol name.
    pub fn new(guid: Guid, protocol_name: impl Into<String>) -> Self {
        let protocol_name = protocol_name.into();
        let interface_type_name = interface_type_for(&protocol_name).to_string();
        Self {
            guid,
            protocol_name,
            interface_type_name,
        }
    }

    pub fn with_interface_type(mut self, type_name: impl Into<String>) -> Self {
        self.interface_type_name = type_name.into();
        self
    }
}

/// GUID to protocol mapping.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    entries: HashMap<Guid, ProtocolRegistryEntry>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of well-known UEFI and SMM protocols.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (guid, name) in [
            (
                guid!("5b1b31a1-9562-11d2-8e3f-00a0c969723b"),
                "EFI_LOADED_IMAGE_PROTOCOL_GUID",
            ),
            (
                guid!("09576e91-6d3f-11d2-8e39-00a0c969723b"),
                "EFI_DEVICE_PATH_PROTOCOL_GUID",
            ),
            (
                guid!("387477c2-69c7-11d2-8e39-00a0c969723b"),
                "EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL_GUID",
            ),
            (
                guid!("964e5b21-6459-11d2-8e39-00a0c969723b"),
                "EFI_BLOCK_IO_PROTOCOL_GUID",
            ),
            (
                guid!("964e5b22-6459-11d2-8e39-00a0c969723b"),
                "EFI_SIMPLE_FILE_SYSTEM_PROTOCOL_GUID",
            ),
            (
                guid!("9042a9de-23dc-4a38-96fb-7aded080516a"),
                "EFI_GRAPHICS_OUTPUT_PROTOCOL_GUID",
            ),
            (
                guid!("f4ccbfb7-f6e0-47fd-9dd4-10a8f150c191"),
                "EFI_SMM_BASE2_PROTOCOL_GUID",
            ),
            (
                guid!("18a3c6dc-5eea-48c8-a1c1-b53389f98999"),
                "EFI_SMM_SW_DISPATCH2_PROTOCOL_GUID",
            ),
        ] {
            registry.insert(ProtocolRegistryEntry::new(guid, name));
        }
        registry
    }

    /// Parses a JSON array of entries.
    ///
    /// Entries without an `interface_type_name` get one derived from the
    /// protocol name.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let entries: Vec<ProtocolRegistryEntry> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for mut entry in entries {
            if entry.interface_type_name.is_empty() {
                entry.interface_type_name = interface_type_for(&entry.protocol_name).to_string();
            }
            registry.insert(entry);
        }
        Ok(registry)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProtocolError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Inserts an entry, replacing any entry for the same GUID.
    pub fn insert(&mut self, entry: ProtocolRegistryEntry) {
        self.entries.insert(entry.guid, entry);
    }

    pub fn lookup(&self, guid: &Guid) -> Option<&ProtocolRegistryEntry> {
        self.entries.get(guid)
    }

    /// Looks up an entry by protocol name.
    pub fn lookup_name(&self, protocol_name: &str) -> Option<&ProtocolRegistryEntry> {
        self.entries.values().find(|e| e.protocol_name == protocol_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A call site discovered upstream that plausibly obtains a protocol
/// interface.
///
/// Also accepts the short field names of protocol scanner reports (`ea`,
/// `func_ea`, `prot_name`); unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolUsageRecord {
    /// Address of the service call.
    #[serde(alias = "ea")]
    pub code_address: u64,

    /// Entry of the function containing the call, when already known.
    #[serde(default, alias = "func_ea", skip_serializing_if = "Option::is_none")]
    pub function_address: Option<u64>,

    /// Service the call goes through (e.g. `LocateProtocol`).
    #[serde(default)]
    pub service: String,

    /// GUID passed at the call site, when discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,

    #[serde(default, alias = "prot_name", skip_serializing_if = "Option::is_none")]
    pub protocol_name: Option<String>,
}

impl ProtocolUsageRecord {
    pub fn new(code_address: u64, service: impl Into<String>) -> Self {
        Self {
            code_address,
            function_address: None,
            service: service.into(),
            guid: None,
            protocol_name: None,
        }
    }

    pub fn with_guid(mut self, guid: Guid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn with_protocol_name(mut self, name: impl Into<String>) -> Self {
        self.protocol_name = Some(name.into());
        self
    }

    pub fn with_function(mut self, function_address: u64) -> Self {
        self.function_address = Some(function_address);
        self
    }

    /// Whether this record describes `guid` (records without a GUID match
    /// any).
    pub fn matches_guid(&self, guid: &Guid) -> bool {
        self.guid.as_ref().map_or(true, |g| g == guid)
    }

    /// Parses a JSON array of records.
    pub fn load_all(json: &str) -> Result<Vec<Self>, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, ProtocolError> {
        Self::load_all(&fs::read_to_string(path)?)
    }
}
