use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use smallvec::SmallVec;

use crate::config::TransformOptions;
use crate::error::TransformError;

/// One identifier brought in by a named import.
///
/// `local` is the name used in the body, `exported` the library member it
/// refers to. They differ only for aliased imports (`Line as L`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub local: String,
    pub exported: String,
}

pub type ImportedNames = SmallVec<[ImportedName; 8]>;

#[derive(Debug, Default)]
pub(super) struct ImportScan {
    pub names: ImportedNames,
    /// Local aliases of `import * as X from '<library>'`.
    pub namespace_aliases: SmallVec<[String; 2]>,
    pub found_library_import: bool,
    pub diagnostics: Vec<TransformError>,
}

fn import_statement_regex() -> &'static Regex {
    static IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();
    IMPORT_REGEX.get_or_init(|| {
        // `import <clause> from '<module>';` or a bare `import '<module>';`
        Regex::new(
            r#"(?m)^[ \t]*import\s+(?:(?P<clause>[^'";]*?)\s+from\s+)?["'](?P<module>[^"']+)["'][ \t]*;?[ \t]*\r?\n?"#,
        )
        .expect("Failed to compile import regex")
    })
}

fn named_clause_regex() -> &'static Regex {
    static NAMED_REGEX: OnceLock<Regex> = OnceLock::new();
    NAMED_REGEX.get_or_init(|| {
        Regex::new(r"\{(?P<names>[^}]*)\}").expect("Failed to compile named import regex")
    })
}

fn namespace_clause_regex() -> &'static Regex {
    static NAMESPACE_REGEX: OnceLock<Regex> = OnceLock::new();
    NAMESPACE_REGEX.get_or_init(|| {
        Regex::new(r"\*\s*as\s+(?P<alias>[A-Za-z_$][\w$]*)")
            .expect("Failed to compile namespace import regex")
    })
}

fn identifier_regex() -> &'static Regex {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENT_REGEX.get_or_init(|| {
        Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").expect("Failed to compile identifier regex")
    })
}

/// Strips every import statement, collecting library names along the way.
///
/// Runtime imports are dropped silently; imports of any other module are
/// dropped and reported.
pub(super) fn strip_imports(source: &str, options: &TransformOptions) -> (String, ImportScan) {
    let mut scan = ImportScan::default();
    let stripped = import_statement_regex().replace_all(source, |caps: &Captures<'_>| {
        let module = &caps["module"];
        let clause = caps.name("clause").map_or("", |m| m.as_str());
        if module == options.library_module {
            scan.found_library_import = true;
            collect_library_clause(clause, &mut scan);
        } else if module != options.runtime_module {
            scan.diagnostics.push(TransformError::StrayImport {
                module: module.to_owned(),
            });
        }
        String::new()
    });
    (stripped.into_owned(), scan)
}

fn collect_library_clause(clause: &str, scan: &mut ImportScan) {
    if let Some(caps) = namespace_clause_regex().captures(clause) {
        scan.namespace_aliases.push(caps["alias"].to_owned());
    }
    let Some(caps) = named_clause_regex().captures(clause) else {
        return;
    };
    for entry in caps["names"].split(',') {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with("type ") {
            continue;
        }
        let (exported, local) = match entry.split_once(" as ") {
            Some((exported, local)) => (exported.trim(), local.trim()),
            None => (entry, entry),
        };
        if exported.is_empty() || local.is_empty() {
            continue;
        }
        if scan.names.iter().any(|name| name.local == local) {
            continue;
        }
        scan.names.push(ImportedName {
            local: local.to_owned(),
            exported: exported.to_owned(),
        });
    }
}

/// Rewrites whole-word identifier occurrences to `namespace.member`.
///
/// Member accesses (`x.Line`) and already qualified names are left alone, and
/// identifiers that merely contain an imported name (`LineData`) never match.
pub(super) fn qualify_identifiers(
    body: &str,
    namespace: &str,
    names: &[ImportedName],
    namespace_aliases: &[String],
) -> String {
    if names.is_empty() && namespace_aliases.is_empty() {
        return body.to_owned();
    }

    let mut replacements: HashMap<&str, String> = names
        .iter()
        .map(|name| (name.local.as_str(), format!("{namespace}.{}", name.exported)))
        .collect();
    for alias in namespace_aliases {
        if alias != namespace {
            replacements.insert(alias.as_str(), namespace.to_owned());
        }
    }

    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len() + names.len() * namespace.len());
    let mut cursor = 0;
    for found in identifier_regex().find_iter(body) {
        let Some(replacement) = replacements.get(found.as_str()) else {
            continue;
        };
        if found.start() > 0 {
            let previous = bytes[found.start() - 1];
            if follows_member_dot(bytes, found.start())
                || previous.is_ascii_alphanumeric()
                || previous == b'_'
            {
                continue;
            }
        }
        out.push_str(&body[cursor..found.start()]);
        out.push_str(replacement);
        cursor = found.end();
    }
    out.push_str(&body[cursor..]);
    out
}

/// Whether the identifier at `start` is a property name (`x.Line`,
/// `x?.Line`) rather than a spread operand (`...Line`).
fn follows_member_dot(bytes: &[u8], start: usize) -> bool {
    start > 0 && bytes[start - 1] == b'.' && !(start >= 3 && &bytes[start - 3..start] == b"...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TransformOptions {
        TransformOptions::default()
    }

    #[test]
    fn collects_named_and_aliased_imports() {
        let source = "import { LineChart, Line as L, XAxis } from 'recharts';\nconst a = 1;\n";
        let (stripped, scan) = strip_imports(source, &options());
        assert_eq!(stripped, "const a = 1;\n");
        assert!(scan.found_library_import);
        let locals: Vec<_> = scan.names.iter().map(|n| n.local.as_str()).collect();
        assert_eq!(locals, ["LineChart", "L", "XAxis"]);
        assert_eq!(scan.names[1].exported, "Line");
    }

    #[test]
    fn multiline_named_import_is_recognized() {
        let source = "import {\n  BarChart,\n  Bar,\n} from \"recharts\";\nBar;";
        let (stripped, scan) = strip_imports(source, &options());
        assert_eq!(stripped, "Bar;");
        assert_eq!(scan.names.len(), 2);
    }

    #[test]
    fn runtime_import_is_dropped_without_diagnostic() {
        let source = "import React, { useState } from 'react';\nimport 'recharts/styles.css';\nx;";
        let (stripped, scan) = strip_imports(source, &options());
        assert_eq!(stripped, "x;");
        assert_eq!(
            scan.diagnostics,
            vec![TransformError::StrayImport {
                module: "recharts/styles.css".to_owned()
            }]
        );
    }

    #[test]
    fn qualification_skips_members_and_longer_words() {
        let names = [ImportedName {
            local: "Line".to_owned(),
            exported: "Line".to_owned(),
        }];
        let out = qualify_identifiers(
            "<Line data={LineData} /> obj.Line Recharts.Line $Line Line$",
            "Recharts",
            &names,
            &[],
        );
        assert_eq!(
            out,
            "<Recharts.Line data={LineData} /> obj.Line Recharts.Line $Line Line$"
        );
    }

    #[test]
    fn spread_operands_are_qualified() {
        let names = [ImportedName {
            local: "Line".to_owned(),
            exported: "Line".to_owned(),
        }];
        let out = qualify_identifiers(
            "const all = { ...Line }; [...Line]; a?.Line; a.Line",
            "Recharts",
            &names,
            &[],
        );
        assert_eq!(
            out,
            "const all = { ...Recharts.Line }; [...Recharts.Line]; a?.Line; a.Line"
        );
    }

    #[test]
    fn namespace_alias_is_renamed() {
        let out = qualify_identifiers(
            "<RC.LineChart />",
            "Recharts",
            &[],
            &["RC".to_owned()],
        );
        assert_eq!(out, "<Recharts.LineChart />");
    }
}
