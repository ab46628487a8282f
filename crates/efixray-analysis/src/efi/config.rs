//! Retyping pass configuration.

use super::services::ServiceTableKind;

/// Configuration for the GUID retyping pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetypeConfig {
    /// Service tables whose calls are retyped, in traversal order.
    pub tables: Vec<ServiceTableKind>,
    /// Accept a GUID only when a usage record for the visited call site
    /// names it. When false, any GUID in the protocol registry is accepted.
    pub require_usage_site: bool,
    /// Decide and report without touching the variable store.
    pub dry_run: bool,
}

impl Default for RetypeConfig {
    fn default() -> Self {
        Self {
            tables: ServiceTableKind::all().to_vec(),
            require_usage_site: true,
            dry_run: false,
        }
    }
}

impl RetypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the pass to the given tables.
    pub fn with_tables(mut self, tables: impl IntoIterator<Item = ServiceTableKind>) -> Self {
        self.tables = Vec::new();
        for kind in tables {
            if !self.tables.contains(&kind) {
                self.tables.push(kind);
            }
        }
        self
    }

    /// Parses a comma separated table list such as `"bs,smm"`.
    ///
    /// Returns None if any item is not a known table.
    pub fn with_table_list(self, list: &str) -> Option<Self> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ServiceTableKind::parse)
            .collect::<Option<Vec<_>>>()?;
        Some(self.with_tables(kinds))
    }

    pub fn with_usage_site_restriction(mut self, enable: bool) -> Self {
        self.require_usage_site = enable;
        self
    }

    pub fn with_dry_run(mut self, enable: bool) -> Self {
        self.dry_run = enable;
        self
    }

    pub fn is_table_enabled(&self, kind: ServiceTableKind) -> bool {
        self.tables.contains(&kind)
    }
}
