//! Property-based tests for the service catalogs and the retyper.
//!
//! These tests verify:
//! - Every catalog descriptor has its argument indices in range
//! - Runtime descriptor construction rejects out-of-range indices
//! - Offset lookup returns exactly the descriptor at that offset
//! - Calls at offsets outside the catalog never touch the variable store
//! - GUID arguments that are not constant references never touch the store

use proptest::prelude::*;
use std::sync::Arc;

use efixray_analysis::decompiler::{
    BinaryDataContext, CallTarget, DecompiledFunction, Expr, LocalVariable, StructuredNode,
    Variable,
};
use efixray_analysis::efi::{
    AnalysisContext, CallDescriptor, GuidRetyper, ProtocolRegistry, ProtocolUsageRecord,
    RetypeConfig, ServiceTable, ServiceTableKind, ServiceTableRegistry, VariableStore,
};
use efixray_analysis::Error;
use efixray_types::{builtin, CType, TypeDatabase};
use uguid::guid;

// =============================================================================
// Helpers
// =============================================================================

const GUID_ADDR: u64 = 0x3000;
const CALL_ADDR: u64 = 0x1010;

#[derive(Default)]
struct CountingStore {
    writes: usize,
}

impl VariableStore for CountingStore {
    fn set_type(&mut self, _function: u64, _variable: &LocalVariable, _ty: &CType) -> bool {
        self.writes += 1;
        true
    }
}

fn uefi_db() -> TypeDatabase {
    let mut db = TypeDatabase::new();
    builtin::load_uefi_types(&mut db);
    db
}

fn guid_data() -> BinaryDataContext {
    let mut data = BinaryDataContext::new();
    data.add_section(
        GUID_ADDR,
        guid!("964e5b21-6459-11d2-8e39-00a0c969723b").to_bytes().to_vec(),
    );
    data
}

fn boot_services_call(offset: usize, args: Vec<Expr>) -> DecompiledFunction {
    let gbs = Expr::var(Variable::global(0x5000, 8).named("gBS"));
    let call = Expr::call_at(
        CALL_ADDR,
        CallTarget::Indirect(Box::new(Expr::field(gbs, "Slot", offset))),
        args,
    );
    DecompiledFunction::new(0x1000, "f")
        .with_local(LocalVariable::stack(-0x18, CType::ptr(CType::void()), 8))
        .with_body(vec![StructuredNode::block(0, vec![call])])
}

fn run(function: &DecompiledFunction) -> (usize, Vec<Error>) {
    let types = uefi_db();
    let protocols = ProtocolRegistry::builtin();
    let data = guid_data();
    let ctx = AnalysisContext::new(&types, &protocols, &data);

    let mut retyper = GuidRetyper::new(Arc::new(ServiceTable::boot_services()));
    retyper.set_protocols(vec![ProtocolUsageRecord::new(CALL_ADDR, "LocateProtocol")].into());
    retyper.set_code_ea(CALL_ADDR);
    retyper.set_func_ea(function.address);

    let mut store = CountingStore::default();
    let report = retyper.apply(function, &ctx, &mut store, &RetypeConfig::new());
    let errors = report.failures().map(|(_, e)| e.clone()).collect();
    (store.writes, errors)
}

fn dest() -> Expr {
    Expr::address_of(Expr::var(Variable::stack(-0x18, 8)))
}

// =============================================================================
// Catalog Properties
// =============================================================================

#[test]
fn builtin_descriptors_are_well_formed() {
    let registry = ServiceTableRegistry::builtin();
    assert_eq!(registry.len(), 2);
    for table in registry.tables() {
        for desc in table.entries() {
            assert!(desc.is_well_formed(), "{} in {}", desc.name, table.name);
        }
    }
}

#[test]
fn layout_catalog_matches_builtin_on_x64() {
    let from_layouts = ServiceTableRegistry::from_layouts(&uefi_db()).unwrap();
    for &kind in ServiceTableKind::all() {
        let built = from_layouts.get_kind(kind).unwrap();
        assert_eq!(built.entries(), kind.catalog().entries());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Descriptor construction succeeds exactly when both indices are in range.
    #[test]
    fn try_new_checks_indices(arg_count in 0u32..8, guid in 0u32..10, iface in 0u32..10) {
        let result = CallDescriptor::try_new("Generated", 0x10, arg_count, guid, iface, 1);
        prop_assert_eq!(result.is_ok(), guid < arg_count && iface < arg_count);
        if let Ok(desc) = result {
            prop_assert!(desc.is_well_formed());
        }
    }

    /// Lookup by offset finds the descriptor at that offset or nothing.
    #[test]
    fn find_by_offset_is_exact(offset in 0u32..0x200) {
        for &kind in ServiceTableKind::all() {
            let table = kind.catalog();
            let expected = table.entries().iter().any(|d| d.table_offset == offset);
            match table.find_by_offset(offset) {
                Some(desc) => {
                    prop_assert_eq!(desc.table_offset, offset);
                }
                None => {
                    prop_assert!(!expected);
                }
            }
        }
    }
}

// =============================================================================
// Retyper Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A call at an offset no descriptor names is ignored silently.
    #[test]
    fn unmatched_offset_never_mutates(offset in (0usize..0x200).prop_map(|o| o & !7)) {
        let catalog = ServiceTable::boot_services();
        prop_assume!(catalog.find_by_offset(offset as u32).is_none());

        let guid = Expr::address_of(Expr::var(Variable::global(GUID_ADDR, 16)));
        let function = boot_services_call(offset, vec![guid, Expr::int(0), dest()]);
        let (writes, errors) = run(&function);
        prop_assert_eq!(writes, 0);
        prop_assert!(errors.is_empty());
    }

    /// A GUID argument held in a stack slot is never resolved.
    #[test]
    fn stack_guid_is_unresolved(slot in 1i64..0x100) {
        let guid = Expr::var(Variable::stack(-slot * 8, 8));
        let function = boot_services_call(0x140, vec![guid, Expr::int(0), dest()]);
        let (writes, errors) = run(&function);
        prop_assert_eq!(writes, 0);
        prop_assert_eq!(errors.len(), 1);
        let is_unresolved = matches!(errors[0], Error::UnresolvedGuid { site: CALL_ADDR, .. });
        prop_assert!(is_unresolved);
    }
}
