use std::sync::OnceLock;

use regex::Regex;

/// Which default-export form the source used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportForm {
    /// `export default function Name(...)`, renamed to the internal name.
    Function { name: Option<String> },
    /// `export default Identifier;`, captured by reference.
    Identifier { name: String },
    /// `export default <expression>` such as an arrow function.
    Expression,
    /// No default export matched; the wrapper yields `undefined`.
    Missing,
}

impl ExportForm {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

fn default_function_regex() -> &'static Regex {
    static FUNCTION_REGEX: OnceLock<Regex> = OnceLock::new();
    FUNCTION_REGEX.get_or_init(|| {
        Regex::new(r"\bexport\s+default\s+function\s*(?P<name>[A-Za-z_$][\w$]*)?\s*\(")
            .expect("Failed to compile default function export regex")
    })
}

fn default_identifier_regex() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX.get_or_init(|| {
        Regex::new(r"(?m)\bexport\s+default\s+(?P<name>[A-Za-z_$][\w$]*)[ \t]*(?:;|$)")
            .expect("Failed to compile default identifier export regex")
    })
}

fn default_keyword_regex() -> &'static Regex {
    static KEYWORD_REGEX: OnceLock<Regex> = OnceLock::new();
    KEYWORD_REGEX.get_or_init(|| {
        Regex::new(r"\bexport\s+default\s+").expect("Failed to compile default export regex")
    })
}

fn named_export_regex() -> &'static Regex {
    static NAMED_REGEX: OnceLock<Regex> = OnceLock::new();
    NAMED_REGEX.get_or_init(|| {
        Regex::new(r"\bexport\s+(?P<decl>function|const|let|var)\b")
            .expect("Failed to compile named export regex")
    })
}

#[derive(Debug)]
pub(super) struct ExportRewrite {
    pub body: String,
    pub form: ExportForm,
    pub duplicates: usize,
}

/// Rewrites the first default export so it binds `component_name`.
///
/// Later default exports lose their `export default` prefix so the body
/// still parses; named exports lose their `export` keyword.
pub(super) fn rewrite_default_export(body: &str, component_name: &str) -> ExportRewrite {
    let first = default_keyword_regex().find(body);
    let Some(first) = first else {
        return ExportRewrite {
            body: strip_named_exports(body),
            form: ExportForm::Missing,
            duplicates: 0,
        };
    };

    let head = &body[..first.start()];
    let tail = &body[first.start()..];
    let (rewritten_tail, form) = if let Some(caps) = default_function_regex()
        .captures(tail)
        .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
    {
        let name = caps.name("name").map(|m| m.as_str().to_owned());
        let matched_len = caps.get(0).map_or(0, |m| m.end());
        (
            format!("function {component_name}({}", &tail[matched_len..]),
            ExportForm::Function { name },
        )
    } else if let Some(caps) = default_identifier_regex()
        .captures(tail)
        .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
    {
        let name = caps["name"].to_owned();
        let matched_len = caps.get(0).map_or(0, |m| m.end());
        (
            format!("{component_name} = {name};{}", &tail[matched_len..]),
            ExportForm::Identifier { name },
        )
    } else {
        (
            format!("{component_name} = {}", &tail[first.len()..]),
            ExportForm::Expression,
        )
    };

    let mut duplicates = 0;
    let rewritten_tail = default_keyword_regex()
        .replace_all(&rewritten_tail, |_: &regex::Captures<'_>| {
            duplicates += 1;
            String::new()
        })
        .into_owned();

    ExportRewrite {
        body: strip_named_exports(&format!("{head}{rewritten_tail}")),
        form,
        duplicates,
    }
}

fn strip_named_exports(body: &str) -> String {
    named_export_regex().replace_all(body, "$decl").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "__DynamicChart";

    #[test]
    fn default_function_is_renamed() {
        let out = rewrite_default_export("export default function Vendas({ data }) {}", NAME);
        assert_eq!(out.body, "function __DynamicChart({ data }) {}");
        assert_eq!(
            out.form,
            ExportForm::Function {
                name: Some("Vendas".to_owned())
            }
        );
    }

    #[test]
    fn anonymous_default_function_is_named() {
        let out = rewrite_default_export("export default function () { return null; }", NAME);
        assert_eq!(out.body, "function __DynamicChart() { return null; }");
        assert_eq!(out.form, ExportForm::Function { name: None });
    }

    #[test]
    fn default_identifier_is_captured() {
        let out = rewrite_default_export("const Chart = () => null;\nexport default Chart;\n", NAME);
        assert_eq!(out.body, "const Chart = () => null;\n__DynamicChart = Chart;\n");
        assert_eq!(
            out.form,
            ExportForm::Identifier {
                name: "Chart".to_owned()
            }
        );
    }

    #[test]
    fn default_identifier_without_semicolon_at_end_of_input() {
        let out = rewrite_default_export("export default Chart", NAME);
        assert_eq!(out.body, "__DynamicChart = Chart;");
    }

    #[test]
    fn default_expression_is_assigned() {
        let out = rewrite_default_export("export default () => <div />;", NAME);
        assert_eq!(out.body, "__DynamicChart = () => <div />;");
        assert_eq!(out.form, ExportForm::Expression);
    }

    #[test]
    fn call_expression_is_not_mistaken_for_identifier() {
        let out = rewrite_default_export("export default memo(Chart);", NAME);
        assert_eq!(out.form, ExportForm::Expression);
        assert_eq!(out.body, "__DynamicChart = memo(Chart);");
    }

    #[test]
    fn missing_export_strips_named_exports() {
        let out = rewrite_default_export("export const data = [];\nexport function A() {}", NAME);
        assert_eq!(out.body, "const data = [];\nfunction A() {}");
        assert!(out.form.is_missing());
    }

    #[test]
    fn duplicate_default_exports_are_counted() {
        let out = rewrite_default_export(
            "export default function A() {}\nexport default B;",
            NAME,
        );
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.body, "function __DynamicChart() {}\nB;");
    }
}
