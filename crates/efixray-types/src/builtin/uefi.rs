//! UEFI type definitions (x64 / LLP64 layout).

use crate::database::TypeDatabase;
use crate::types::*;

/// Registered name of the boot services table.
pub const BOOT_SERVICES_TYPE: &str = "EFI_BOOT_SERVICES";

/// Registered name of the SMM system table.
pub const SMM_SYSTEM_TABLE_TYPE: &str = "_EFI_SMM_SYSTEM_TABLE2";

fn named(name: &str) -> CType {
    CType::named(name)
}

fn named_ptr(name: &str) -> CType {
    CType::ptr(CType::named(name))
}

fn void_ptr() -> CType {
    CType::ptr(CType::void())
}

/// Pointer to an EFIAPI function returning `EFI_STATUS`.
fn efiapi(params: &[(&str, CType)]) -> CType {
    let func = params
        .iter()
        .fold(FunctionType::new(named("EFI_STATUS")), |f, (name, ty)| {
            f.param(*name, ty.clone())
        });
    CType::ptr(CType::Function(func))
}

/// Service slot whose parameters are not modeled.
fn service() -> CType {
    efiapi(&[])
}

/// Load UEFI types into the database.
///
/// Struct layouts are computed by the database, so loading into a database
/// configured for a 32-bit architecture yields IA32 offsets.
pub fn load_uefi_types(db: &mut TypeDatabase) {
    load_base_types(db);
    load_boot_services(db);
    load_smm_system_table(db);
    load_protocol_interfaces(db);
    load_system_table(db);
}

fn load_base_types(db: &mut TypeDatabase) {
    db.add_typedef("INT8", CType::Int(IntType::new(1, true)));
    db.add_typedef("UINT8", CType::Int(IntType::new(1, false)));
    db.add_typedef("INT16", CType::Int(IntType::new(2, true)));
    db.add_typedef("UINT16", CType::Int(IntType::new(2, false)));
    db.add_typedef("INT32", CType::Int(IntType::new(4, true)));
    db.add_typedef("UINT32", CType::Int(IntType::new(4, false)));
    db.add_typedef("INT64", CType::Int(IntType::new(8, true)));
    db.add_typedef("UINT64", CType::Int(IntType::new(8, false)));

    let native = db.arch().pointer_size;
    db.add_typedef("INTN", CType::Int(IntType::new(native, true)));
    db.add_typedef("UINTN", CType::Int(IntType::new(native, false)));

    db.add_typedef("BOOLEAN", named("UINT8"));
    db.add_typedef("CHAR8", named("UINT8"));
    db.add_typedef("CHAR16", named("UINT16"));
    db.add_typedef("EFI_STATUS", named("UINTN"));
    db.add_typedef("EFI_TPL", named("UINTN"));
    db.add_typedef("EFI_HANDLE", void_ptr());
    db.add_typedef("EFI_EVENT", void_ptr());
    db.add_typedef("EFI_PHYSICAL_ADDRESS", named("UINT64"));

    db.add_struct(
        "EFI_GUID",
        vec![
            ("Data1", named("UINT32")),
            ("Data2", named("UINT16")),
            ("Data3", named("UINT16")),
            ("Data4", CType::array(named("UINT8"), Some(8))),
        ],
    );

    db.add_struct(
        "EFI_TABLE_HEADER",
        vec![
            ("Signature", named("UINT64")),
            ("Revision", named("UINT32")),
            ("HeaderSize", named("UINT32")),
            ("CRC32", named("UINT32")),
            ("Reserved", named("UINT32")),
        ],
    );
}

fn load_boot_services(db: &mut TypeDatabase) {
    let guid_ptr = || named_ptr("EFI_GUID");
    let out_iface = || CType::ptr(void_ptr());

    db.add_struct(
        BOOT_SERVICES_TYPE,
        vec![
            ("Hdr", named("EFI_TABLE_HEADER")),
            // Task priority
            ("RaiseTPL", service()),
            ("RestoreTPL", service()),
            // Memory
            ("AllocatePages", service()),
            ("FreePages", service()),
            ("GetMemoryMap", service()),
            ("AllocatePool", service()),
            ("FreePool", service()),
            // Events and timers
            ("CreateEvent", service()),
            ("SetTimer", service()),
            ("WaitForEvent", service()),
            ("SignalEvent", service()),
            ("CloseEvent", service()),
            ("CheckEvent", service()),
            // Protocol handlers
            ("InstallProtocolInterface", service()),
            ("ReinstallProtocolInterface", service()),
            ("UninstallProtocolInterface", service()),
            (
                "HandleProtocol",
                efiapi(&[
                    ("Handle", named("EFI_HANDLE")),
                    ("Protocol", guid_ptr()),
                    ("Interface", out_iface()),
                ]),
            ),
            ("Reserved", void_ptr()),
            ("RegisterProtocolNotify", service()),
            ("LocateHandle", service()),
            ("LocateDevicePath", service()),
            ("InstallConfigurationTable", service()),
            // Images
            ("LoadImage", service()),
            ("StartImage", service()),
            ("Exit", service()),
            ("UnloadImage", service()),
            ("ExitBootServices", service()),
            // Miscellaneous
            ("GetNextMonotonicCount", service()),
            ("Stall", service()),
            ("SetWatchdogTimer", service()),
            // Driver support
            ("ConnectController", service()),
            ("DisconnectController", service()),
            // Open and close protocol
            (
                "OpenProtocol",
                efiapi(&[
                    ("Handle", named("EFI_HANDLE")),
                    ("Protocol", guid_ptr()),
                    ("Interface", out_iface()),
                    ("AgentHandle", named("EFI_HANDLE")),
                    ("ControllerHandle", named("EFI_HANDLE")),
                    ("Attributes", named("UINT32")),
                ]),
            ),
            ("CloseProtocol", service()),
            ("OpenProtocolInformation", service()),
            // Library
            ("ProtocolsPerHandle", service()),
            ("LocateHandleBuffer", service()),
            (
                "LocateProtocol",
                efiapi(&[
                    ("Protocol", guid_ptr()),
                    ("Registration", void_ptr()),
                    ("Interface", out_iface()),
                ]),
            ),
            ("InstallMultipleProtocolInterfaces", service()),
            ("UninstallMultipleProtocolInterfaces", service()),
            // CRC and memory utilities
            ("CalculateCrc32", service()),
            ("CopyMem", service()),
            ("SetMem", service()),
            ("CreateEventEx", service()),
        ],
    );
}

fn load_smm_system_table(db: &mut TypeDatabase) {
    let guid_ptr = || named_ptr("EFI_GUID");
    let out_iface = || CType::ptr(void_ptr());

    db.add_struct(
        "EFI_SMM_IO_ACCESS2",
        vec![("Read", service()), ("Write", service())],
    );
    db.add_struct(
        "EFI_SMM_CPU_IO2_PROTOCOL",
        vec![
            ("Mem", named("EFI_SMM_IO_ACCESS2")),
            ("Io", named("EFI_SMM_IO_ACCESS2")),
        ],
    );

    db.add_struct(
        SMM_SYSTEM_TABLE_TYPE,
        vec![
            ("Hdr", named("EFI_TABLE_HEADER")),
            ("SmmFirmwareVendor", named_ptr("CHAR16")),
            ("SmmFirmwareRevision", named("UINT32")),
            ("SmmInstallConfigurationTable", service()),
            ("SmmIo", named("EFI_SMM_CPU_IO2_PROTOCOL")),
            ("SmmAllocatePool", service()),
            ("SmmFreePool", service()),
            ("SmmAllocatePages", service()),
            ("SmmFreePages", service()),
            ("SmmStartupThisAp", service()),
            ("CurrentlyExecutingCpu", named("UINTN")),
            ("NumberOfCpus", named("UINTN")),
            ("CpuSaveStateSize", named_ptr("UINTN")),
            ("CpuSaveState", CType::ptr(void_ptr())),
            ("NumberOfTableEntries", named("UINTN")),
            ("SmmConfigurationTable", void_ptr()),
            ("SmmInstallProtocolInterface", service()),
            ("SmmUninstallProtocolInterface", service()),
            (
                "SmmHandleProtocol",
                efiapi(&[
                    ("Handle", named("EFI_HANDLE")),
                    ("Protocol", guid_ptr()),
                    ("Interface", out_iface()),
                ]),
            ),
            ("SmmRegisterProtocolNotify", service()),
            ("SmmLocateHandle", service()),
            (
                "SmmLocateProtocol",
                efiapi(&[
                    ("Protocol", guid_ptr()),
                    ("Registration", void_ptr()),
                    ("Interface", out_iface()),
                ]),
            ),
            ("SmiManage", service()),
            ("SmiHandlerRegister", service()),
            ("SmiHandlerUnRegister", service()),
        ],
    );
    db.add_typedef("EFI_SMM_SYSTEM_TABLE2", named(SMM_SYSTEM_TABLE_TYPE));
}

fn load_protocol_interfaces(db: &mut TypeDatabase) {
    db.add_struct(
        "EFI_DEVICE_PATH_PROTOCOL",
        vec![
            ("Type", named("UINT8")),
            ("SubType", named("UINT8")),
            ("Length", CType::array(named("UINT8"), Some(2))),
        ],
    );

    db.add_struct(
        "EFI_LOADED_IMAGE_PROTOCOL",
        vec![
            ("Revision", named("UINT32")),
            ("ParentHandle", named("EFI_HANDLE")),
            ("SystemTable", void_ptr()),
            ("DeviceHandle", named("EFI_HANDLE")),
            ("FilePath", named_ptr("EFI_DEVICE_PATH_PROTOCOL")),
            ("Reserved", void_ptr()),
            ("LoadOptionsSize", named("UINT32")),
            ("LoadOptions", void_ptr()),
            ("ImageBase", void_ptr()),
            ("ImageSize", named("UINT64")),
            ("ImageCodeType", named("UINT32")),
            ("ImageDataType", named("UINT32")),
            ("Unload", service()),
        ],
    );

    db.add_struct(
        "EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL",
        vec![
            ("Reset", service()),
            ("OutputString", service()),
            ("TestString", service()),
            ("QueryMode", service()),
            ("SetMode", service()),
            ("SetAttribute", service()),
            ("ClearScreen", service()),
            ("SetCursorPosition", service()),
            ("EnableCursor", service()),
            ("Mode", void_ptr()),
        ],
    );

    db.add_struct(
        "EFI_BLOCK_IO_PROTOCOL",
        vec![
            ("Revision", named("UINT64")),
            ("Media", void_ptr()),
            ("Reset", service()),
            ("ReadBlocks", service()),
            ("WriteBlocks", service()),
            ("FlushBlocks", service()),
        ],
    );

    db.add_struct(
        "EFI_SIMPLE_FILE_SYSTEM_PROTOCOL",
        vec![("Revision", named("UINT64")), ("OpenVolume", service())],
    );

    db.add_struct(
        "EFI_GRAPHICS_OUTPUT_PROTOCOL",
        vec![
            ("QueryMode", service()),
            ("SetMode", service()),
            ("Blt", service()),
            ("Mode", void_ptr()),
        ],
    );

    db.add_struct(
        "EFI_SMM_BASE2_PROTOCOL",
        vec![("InSmm", service()), ("GetSmstLocation", service())],
    );

    db.add_struct(
        "EFI_SMM_SW_DISPATCH2_PROTOCOL",
        vec![
            ("Register", service()),
            ("UnRegister", service()),
            ("MaximumSwiValue", named("UINTN")),
        ],
    );
}

fn load_system_table(db: &mut TypeDatabase) {
    db.add_struct(
        "EFI_SYSTEM_TABLE",
        vec![
            ("Hdr", named("EFI_TABLE_HEADER")),
            ("FirmwareVendor", named_ptr("CHAR16")),
            ("FirmwareRevision", named("UINT32")),
            ("ConsoleInHandle", named("EFI_HANDLE")),
            ("ConIn", void_ptr()),
            ("ConsoleOutHandle", named("EFI_HANDLE")),
            ("ConOut", named_ptr("EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL")),
            ("StandardErrorHandle", named("EFI_HANDLE")),
            ("StdErr", named_ptr("EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL")),
            ("RuntimeServices", void_ptr()),
            ("BootServices", named_ptr(BOOT_SERVICES_TYPE)),
            ("NumberOfTableEntries", named("UINTN")),
            ("ConfigurationTable", void_ptr()),
        ],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ArchInfo;

    fn db() -> TypeDatabase {
        let mut db = TypeDatabase::new();
        load_uefi_types(&mut db);
        db
    }

    #[test]
    fn test_base_sizes() {
        let db = db();
        assert_eq!(db.size_of(&named("EFI_GUID")), Some(16));
        assert_eq!(db.size_of(&named("EFI_TABLE_HEADER")), Some(24));
        assert_eq!(db.size_of(&named("EFI_STATUS")), Some(8));
        assert_eq!(db.size_of(&named("EFI_HANDLE")), Some(8));
    }

    #[test]
    fn test_boot_services_offsets() {
        let db = db();
        let off = |f| db.offset_of(BOOT_SERVICES_TYPE, f).unwrap();
        assert_eq!(off("RaiseTPL"), 0x18);
        assert_eq!(off("HandleProtocol"), 0x98);
        assert_eq!(off("LocateHandle"), 0xb0);
        assert_eq!(off("OpenProtocol"), 0x118);
        assert_eq!(off("LocateProtocol"), 0x140);
        assert_eq!(off("CreateEventEx"), 0x170);
    }

    #[test]
    fn test_smm_table_offsets() {
        let db = db();
        let off = |f| db.offset_of(SMM_SYSTEM_TABLE_TYPE, f).unwrap();
        assert_eq!(off("SmmIo"), 0x30);
        assert_eq!(off("SmmAllocatePool"), 0x50);
        assert_eq!(off("SmmHandleProtocol"), 0xb8);
        assert_eq!(off("SmmLocateHandle"), 0xc8);
        assert_eq!(off("SmmLocateProtocol"), 0xd0);
        assert_eq!(db.offset_of("EFI_SMM_SYSTEM_TABLE2", "SmmLocateProtocol"), Ok(0xd0));
    }

    #[test]
    fn test_ia32_layout() {
        let mut db = TypeDatabase::with_arch(ArchInfo { pointer_size: 4 });
        load_uefi_types(&mut db);
        assert_eq!(db.offset_of(BOOT_SERVICES_TYPE, "RaiseTPL"), Ok(0x18));
        assert_eq!(db.offset_of(BOOT_SERVICES_TYPE, "HandleProtocol"), Ok(0x58));
        assert_eq!(db.offset_of(BOOT_SERVICES_TYPE, "OpenProtocol"), Ok(0x98));
        assert_eq!(db.offset_of(BOOT_SERVICES_TYPE, "LocateProtocol"), Ok(0xac));
    }

    #[test]
    fn test_system_table_points_at_boot_services() {
        let db = db();
        assert_eq!(db.offset_of("EFI_SYSTEM_TABLE", "BootServices"), Ok(0x60));
        let Some(CType::Struct(st)) = db.get_type("EFI_SYSTEM_TABLE") else {
            panic!("expected struct");
        };
        let field = st.field_by_name("BootServices").unwrap();
        assert_eq!(field.field_type, named_ptr(BOOT_SERVICES_TYPE));
    }

    #[test]
    fn test_protocol_interfaces_registered() {
        let db = db();
        for name in [
            "EFI_LOADED_IMAGE_PROTOCOL",
            "EFI_DEVICE_PATH_PROTOCOL",
            "EFI_SIMPLE_TEXT_OUTPUT_PROTOCOL",
            "EFI_BLOCK_IO_PROTOCOL",
            "EFI_SIMPLE_FILE_SYSTEM_PROTOCOL",
            "EFI_GRAPHICS_OUTPUT_PROTOCOL",
            "EFI_SMM_BASE2_PROTOCOL",
            "EFI_SMM_SW_DISPATCH2_PROTOCOL",
        ] {
            assert!(db.get_type(name).is_some_and(CType::is_struct), "{name}");
        }
    }
}
