//! Source transformer: turns AI-authored chart component source into a single
//! self-contained closure expression.
//!
//! The rewrite is pattern based. Library imports become qualified namespace
//! references, runtime imports disappear, and the default export is bound to
//! a fixed internal name that the wrapping closure returns. Problems are
//! reported as recovered [`TransformError`] diagnostics; the transformer itself
//! never fails.

mod exports;
mod imports;

pub use exports::ExportForm;
pub use imports::{ImportedName, ImportedNames};

use tracing::{debug, warn};

use crate::config::TransformOptions;
use crate::error::TransformError;

/// Result of rewriting one chart source.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    /// The wrapped, immediately invoked closure.
    pub code: String,
    pub imported: ImportedNames,
    pub export: ExportForm,
    pub diagnostics: Vec<TransformError>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceTransformer {
    options: TransformOptions,
}

impl SourceTransformer {
    #[must_use]
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    #[must_use]
    pub fn transform(&self, source: &str) -> TransformOutput {
        let mut diagnostics = Vec::new();

        let (body, scan) = imports::strip_imports(source, &self.options);
        diagnostics.extend(scan.diagnostics);
        if scan.names.is_empty() && scan.namespace_aliases.is_empty() {
            diagnostics.push(TransformError::MissingLibraryImport {
                module: self.options.library_module.clone(),
            });
        }
        let body = imports::qualify_identifiers(
            &body,
            &self.options.namespace,
            &scan.names,
            &scan.namespace_aliases,
        );

        let rewrite = exports::rewrite_default_export(&body, &self.options.component_name);
        if rewrite.form.is_missing() {
            diagnostics.push(TransformError::MissingDefaultExport);
        }
        if rewrite.duplicates > 0 {
            diagnostics.push(TransformError::DuplicateDefaultExport);
        }

        let name = &self.options.component_name;
        let code = format!(
            "(function () {{\nvar {name};\n{body}\nreturn {name};\n}})()",
            body = rewrite.body.trim_end()
        );

        for diagnostic in &diagnostics {
            warn!(diagnostic = %diagnostic, "chart source rewrite recovered");
        }
        debug!(
            imported = scan.names.len(),
            export = ?rewrite.form,
            code_len = code.len(),
            "chart source transformed"
        );

        TransformOutput {
            code,
            imported: scan.names,
            export: rewrite.form,
            diagnostics,
        }
    }
}
