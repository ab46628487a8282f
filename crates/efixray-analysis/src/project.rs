//! Analysis project persistence.
//!
//! An [`AnalysisProject`] holds the per-function variable types the
//! retyping pass decided, plus the functions a user excluded from
//! retyping. It is the default [`VariableStore`].
//!
//! # Example
//!
//! ```ignore
//! use efixray_analysis::project::AnalysisProject;
//!
//! let mut project = AnalysisProject::new("DxeCore.efi");
//! project.exclude_function(0x1000);
//! project.save("DxeCore.efp")?;
//!
//! let loaded = AnalysisProject::load("DxeCore.efp")?;
//! ```

use crate::decompiler::{LocalVariable, VarKind};
use crate::efi::typer::VariableStore;
use efixray_types::CType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Project file version for compatibility checking.
const PROJECT_VERSION: u32 = 1;

/// Errors that can occur during project operations.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid project file: {0}")]
    InvalidProject(String),

    #[error("Unsupported project version: {0}")]
    UnsupportedVersion(u32),
}

/// Result type for project operations.
pub type ProjectResult<T> = Result<T, ProjectError>;

/// Variable types and exclusions recorded for one binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisProject {
    /// Project file format version.
    pub version: u32,

    /// Path to the binary being analyzed.
    pub binary_path: PathBuf,

    /// Declared variable types by function entry, then variable name.
    #[serde(default)]
    pub variable_types: HashMap<u64, BTreeMap<String, CType>>,

    /// Entries of functions whose variable types are never changed.
    #[serde(default)]
    pub excluded_functions: BTreeSet<u64>,

    /// Whether the project has unsaved changes.
    #[serde(skip)]
    pub dirty: bool,
}

impl AnalysisProject {
    /// Create an empty project. The binary is not checked.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Self {
        Self {
            version: PROJECT_VERSION,
            binary_path: binary_path.as_ref().to_path_buf(),
            variable_types: HashMap::new(),
            excluded_functions: BTreeSet::new(),
            dirty: false,
        }
    }

    /// Load a project from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> ProjectResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut project: Self = serde_json::from_str(&content)?;

        if project.version == 0 {
            return Err(ProjectError::InvalidProject("version 0".to_string()));
        }
        if project.version > PROJECT_VERSION {
            return Err(ProjectError::UnsupportedVersion(project.version));
        }

        project.dirty = false;
        Ok(project)
    }

    /// Save the project to a file.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> ProjectResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        self.dirty = false;
        Ok(())
    }

    // ==================== Variable Types ====================

    /// Record the declared type of a variable.
    pub fn set_variable_type(&mut self, function: u64, variable: impl Into<String>, ty: CType) {
        self.variable_types
            .entry(function)
            .or_default()
            .insert(variable.into(), ty);
        self.dirty = true;
    }

    /// Get the recorded type of a variable.
    pub fn get_variable_type(&self, function: u64, variable: &str) -> Option<&CType> {
        self.variable_types.get(&function)?.get(variable)
    }

    /// Recorded variable types of a function, by name.
    pub fn function_variable_types(&self, function: u64) -> Option<&BTreeMap<String, CType>> {
        self.variable_types.get(&function)
    }

    /// Forget every recorded type of a function.
    pub fn clear_variable_types(&mut self, function: u64) {
        if self.variable_types.remove(&function).is_some() {
            self.dirty = true;
        }
    }

    // ==================== Exclusions ====================

    /// Protect a function's variables from retyping.
    pub fn exclude_function(&mut self, address: u64) {
        if self.excluded_functions.insert(address) {
            self.dirty = true;
        }
    }

    pub fn is_excluded(&self, address: u64) -> bool {
        self.excluded_functions.contains(&address)
    }
}

impl VariableStore for AnalysisProject {
    /// Rejects changes to excluded functions, and register variables too
    /// narrow to hold the new type.
    fn set_type(&mut self, function: u64, variable: &LocalVariable, ty: &CType) -> bool {
        if self.is_excluded(function) {
            return false;
        }
        if let (VarKind::Register(_), Some(size)) = (&variable.kind, ty.size()) {
            if size > variable.size {
                return false;
            }
        }
        self.set_variable_type(function, variable.name.clone(), ty.clone());
        true
    }
}
