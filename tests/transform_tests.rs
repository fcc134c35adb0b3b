use dynchart::config::{EvalLimits, TransformOptions};
use dynchart::error::TransformError;
use dynchart::sandbox::{ChartNode, ElementKind, Sandbox};
use dynchart::transform::{ExportForm, SourceTransformer};
use proptest::prelude::*;

fn evaluate_and_instantiate(source: &str) -> Vec<ChartNode> {
    let out = SourceTransformer::default().transform(source);
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let component = sandbox.evaluate(&out.code).expect("component");
    sandbox
        .instantiate(&component, &serde_json::Map::new())
        .expect("tree")
        .nodes
}

#[test]
fn default_function_export_behaves_like_the_named_function() {
    let source = r#"import React from 'react';
import { LineChart, Line } from 'recharts';

export default function Faturamento() {
  const data = [{ mes: 'Jan', valor: 1 }];
  return <LineChart data={data}><Line dataKey="valor" /></LineChart>;
}
"#;
    let out = SourceTransformer::default().transform(source);
    assert_eq!(
        out.export,
        ExportForm::Function {
            name: Some("Faturamento".to_owned())
        }
    );

    let nodes = evaluate_and_instantiate(source);
    assert_eq!(nodes.len(), 1);
    let ChartNode::Element(chart) = &nodes[0] else {
        panic!("expected chart element");
    };
    assert_eq!(chart.kind, ElementKind::Chart(dynchart::chart::ChartKind::LineChart));
    assert_eq!(chart.children.len(), 1);
}

#[test]
fn identifier_export_keeps_the_original_binding() {
    let source = r#"import { BarChart, Bar } from 'recharts';

const Grafico = () => (
  <BarChart data={[{ x: 1 }]}>
    <Bar dataKey="x" />
  </BarChart>
);

export default Grafico;
"#;
    let out = SourceTransformer::default().transform(source);
    assert_eq!(
        out.export,
        ExportForm::Identifier {
            name: "Grafico".to_owned()
        }
    );
    assert!(out.code.contains("const Grafico = () =>"));

    let nodes = evaluate_and_instantiate(source);
    assert!(matches!(
        &nodes[0],
        ChartNode::Element(chart) if chart.kind == ElementKind::Chart(dynchart::chart::ChartKind::BarChart)
    ));
}

#[test]
fn aliased_imports_point_at_the_library_member() {
    let source = "import { Line as Linha, LineChart } from 'recharts';\nexport default function C() { return <LineChart><Linha dataKey=\"v\" /></LineChart>; }";
    let out = SourceTransformer::default().transform(source);
    assert!(out.code.contains("<Recharts.Line dataKey"));
    assert!(!out.code.contains("Linha"));
    assert_eq!(out.imported.len(), 2);
    assert_eq!(out.imported[0].local, "Linha");
    assert_eq!(out.imported[0].exported, "Line");
}

#[test]
fn custom_namespace_is_used_for_rewrites() {
    let options = TransformOptions {
        namespace: "Charts".to_owned(),
        ..TransformOptions::default()
    };
    let out = SourceTransformer::new(options)
        .transform("import { Pie } from 'recharts';\nexport default function P() { return <Pie />; }");
    assert!(out.code.contains("<Charts.Pie />"));
}

#[test]
fn missing_library_import_is_a_recovered_diagnostic() {
    let out = SourceTransformer::default()
        .transform("export default function Vazio() { return null; }");
    assert_eq!(
        out.diagnostics,
        vec![TransformError::MissingLibraryImport {
            module: "recharts".to_owned()
        }]
    );
    assert!(out.code.contains("function __DynamicChart()"));
}

fn identifier() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z]{0,6}"
}

proptest! {
    #[test]
    fn imported_identifiers_are_rewritten_whole_word_only(
        name in identifier(),
        suffix in "[A-Za-z0-9_]{1,4}",
        prefix in "[a-z_]{1,4}",
    ) {
        let longer = format!("{name}{suffix}");
        let prefixed = format!("{prefix}{name}");
        let source = format!(
            "import {{ {name} }} from 'recharts';\n\
             const a = {name};\n\
             const b = {longer};\n\
             const c = {prefixed};\n\
             const d = obj.{name};\n\
             export default function X() {{ return <{name} />; }}"
        );
        let out = SourceTransformer::default().transform(&source);

        let qualified = format!("Recharts.{name}");
        let expected_assignment = format!("const a = {qualified};");
        let expected_longer = format!("const b = {longer};");
        let expected_prefixed = format!("const c = {prefixed};");
        let expected_member = format!("const d = obj.{name};");
        let expected_element = format!("<{qualified} />");
        prop_assert!(out.code.contains(&expected_assignment));
        prop_assert!(out.code.contains(&expected_longer));
        prop_assert!(out.code.contains(&expected_prefixed));
        prop_assert!(out.code.contains(&expected_member));
        prop_assert!(out.code.contains(&expected_element));
        prop_assert!(!out.code.contains("from 'recharts'"));
        let double = format!("Recharts.Recharts.{name}");
        prop_assert!(!out.code.contains(&double));
    }
}
