//! Property-based tests for layout queries and array classification.
//!
//! These tests verify:
//! - Field offsets are the stored bit offset shifted down by 3
//! - Non-array types are never plain-old-data arrays
//! - An array of k-level pointers to a scalar passes exactly at depth >= k
//! - Classification is monotone in the pointer-depth budget

use proptest::prelude::*;

use efixray_types::{builtin, CType, IntType, StructType, TypeDatabase};

// =============================================================================
// Generators
// =============================================================================

fn arb_scalar() -> impl Strategy<Value = CType> {
    prop_oneof![
        (prop::sample::select(vec![1usize, 2, 4, 8]), prop::bool::ANY)
            .prop_map(|(size, signed)| CType::Int(IntType::new(size, signed))),
        Just(CType::double()),
        Just(CType::void()),
        prop::sample::select(vec!["UINT8", "UINT32", "UINTN", "BOOLEAN", "EFI_STATUS"])
            .prop_map(CType::named),
    ]
}

fn arb_aggregate() -> impl Strategy<Value = CType> {
    prop::sample::select(vec![
        "EFI_GUID",
        "EFI_TABLE_HEADER",
        "EFI_BOOT_SERVICES",
        "EFI_BLOCK_IO_PROTOCOL",
    ])
    .prop_map(CType::named)
}

/// Pointer-depth budgets, including the top of the `u32` range.
fn arb_depth() -> impl Strategy<Value = u32> {
    prop_oneof![
        4 => 0u32..6,
        1 => (u32::MAX - 2)..=u32::MAX,
    ]
}

fn uefi_db() -> TypeDatabase {
    let mut db = TypeDatabase::new();
    builtin::load_uefi_types(&mut db);
    db
}

// =============================================================================
// Layout Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Byte offset is always the bit offset divided by eight, rounded down.
    #[test]
    fn offset_is_bits_over_eight(bits in 0u64..(1 << 20)) {
        let mut st = StructType::new(Some("S".to_string()));
        st.add_field_at_bits("f", CType::uint(), bits);
        let mut db = TypeDatabase::new();
        db.add_type("S", CType::Struct(st));

        prop_assert_eq!(db.offset_of("S", "f"), Ok((bits >> 3) as u32));
    }

    /// Unknown member names never produce an offset.
    #[test]
    fn unknown_field_is_error(name in "[a-z]{1,12}") {
        let db = uefi_db();
        prop_assert!(db.offset_of("EFI_GUID", &name).is_err());
    }
}

// =============================================================================
// Classification Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// Scalars and pointers are never arrays, at any depth.
    #[test]
    fn non_arrays_never_pod(scalar in arb_scalar(), ptrs in 0u32..4, depth in arb_depth()) {
        let db = uefi_db();
        let ty = scalar.with_pointer_depth(ptrs);
        prop_assert!(!db.is_pod_array(&ty, depth));
    }

    /// An array of k-level pointers to a scalar passes iff depth >= k.
    #[test]
    fn pointer_levels_need_budget(
        scalar in arb_scalar(),
        levels in 0u32..4,
        depth in arb_depth(),
        len in proptest::option::of(1usize..64),
    ) {
        let db = uefi_db();
        let arr = CType::array(scalar.with_pointer_depth(levels), len);
        prop_assert_eq!(db.is_pod_array(&arr, depth), depth >= levels);
    }

    /// Arrays of aggregates fail whatever the pointer budget.
    #[test]
    fn aggregate_arrays_never_pod(
        agg in arb_aggregate(),
        levels in 0u32..3,
        depth in arb_depth(),
    ) {
        let db = uefi_db();
        let arr = CType::array(agg.with_pointer_depth(levels), Some(4));
        prop_assert!(!db.is_pod_array(&arr, depth));
    }

    /// Raising the budget never turns a passing array into a failing one.
    #[test]
    fn pod_is_monotone_in_depth(scalar in arb_scalar(), levels in 0u32..4, depth in 0u32..5) {
        let db = uefi_db();
        let arr = CType::array(scalar.with_pointer_depth(levels), Some(2));
        if db.is_pod_array(&arr, depth) {
            prop_assert!(db.is_pod_array(&arr, depth + 1));
        }
    }
}
