//! Runs the retyping pass over every protocol usage record.

use super::config::RetypeConfig;
use super::protocols::{ProtocolRegistry, ProtocolUsageRecord};
use super::report::RetypeReport;
use super::retyper::{AnalysisContext, GuidRetyper};
use super::services::ServiceTableRegistry;
use super::typer::VariableStore;
use crate::decompiler::FunctionSource;
use crate::error::{Error, Result};
use efixray_types::TypeDatabase;
use std::sync::Arc;

/// Drives one [`GuidRetyper`] per enabled service table over the
/// functions that usage records point into.
///
/// A function holding several records is decompiled and walked once per
/// record; retyping the same site twice writes the same type.
pub struct Driver<'a> {
    source: &'a dyn FunctionSource,
    types: &'a TypeDatabase,
    protocols: &'a ProtocolRegistry,
    retypers: Vec<GuidRetyper>,
    config: RetypeConfig,
}

impl<'a> Driver<'a> {
    /// Creates a driver with one retyper per table enabled in `config`, in
    /// the configured order.
    pub fn new(
        source: &'a dyn FunctionSource,
        types: &'a TypeDatabase,
        protocols: &'a ProtocolRegistry,
        tables: &ServiceTableRegistry,
        config: RetypeConfig,
    ) -> Self {
        let retypers = config
            .tables
            .iter()
            .filter_map(|&kind| match tables.get_kind(kind) {
                Some(table) => Some(GuidRetyper::new(Arc::clone(table))),
                None => {
                    tracing::warn!(table = %kind, "no catalog registered for table");
                    None
                }
            })
            .collect();

        Self {
            source,
            types,
            protocols,
            retypers,
            config,
        }
    }

    pub fn config(&self) -> &RetypeConfig {
        &self.config
    }

    /// Retypes interface variables for every record.
    ///
    /// Records whose function cannot be found or decompiled are skipped and
    /// listed in the report; the batch always completes.
    pub fn run(
        &mut self,
        records: &[ProtocolUsageRecord],
        store: &mut dyn VariableStore,
    ) -> RetypeReport {
        let shared: Arc<[ProtocolUsageRecord]> = records.to_vec().into();
        for retyper in &mut self.retypers {
            retyper.set_protocols(Arc::clone(&shared));
        }

        let mut report = RetypeReport::new();
        for record in records {
            report.stats.records += 1;
            match self.process_record(record, store) {
                Ok(record_report) => report.merge(record_report),
                Err(err) => {
                    tracing::debug!(code_ea = record.code_address, error = %err, "record skipped");
                    report.skip_record(err);
                }
            }
        }

        tracing::info!(
            records = report.stats.records,
            skipped = report.stats.skipped_records,
            retyped = report.stats.retyped,
            failures = report.stats.failures,
            "retyping finished"
        );
        report
    }

    #[tracing::instrument(level = "debug", skip_all, fields(code_ea = record.code_address))]
    fn process_record(
        &mut self,
        record: &ProtocolUsageRecord,
        store: &mut dyn VariableStore,
    ) -> Result<RetypeReport> {
        let func_ea = record
            .function_address
            .or_else(|| self.source.function_containing(record.code_address))
            .ok_or(Error::FunctionNotFound(record.code_address))?;
        let function = self.source.decompile(func_ea)?;

        let ctx = AnalysisContext::new(self.types, self.protocols, self.source.data());
        let mut report = RetypeReport::new();
        for retyper in &mut self.retypers {
            retyper.set_code_ea(record.code_address);
            retyper.set_func_ea(func_ea);
            report.merge(retyper.apply(&function, &ctx, store, &self.config));
        }
        Ok(report)
    }
}

/// Runs the builtin-catalog pass over `records` in one call.
pub fn retype_all(
    source: &dyn FunctionSource,
    types: &TypeDatabase,
    protocols: &ProtocolRegistry,
    records: &[ProtocolUsageRecord],
    store: &mut dyn VariableStore,
    config: RetypeConfig,
) -> RetypeReport {
    let tables = ServiceTableRegistry::builtin();
    Driver::new(source, types, protocols, &tables, config).run(records, store)
}
