use dynchart::config::{EvalLimits, RendererConfig};
use dynchart::error::EvalError;
use dynchart::mount::{MessageId, RenderState, RenderTarget};
use dynchart::sandbox::{
    CallbackInvoker, ChartNode, DENIED_GLOBALS, ElementKind, ElementTree, PropValue, Sandbox,
};
use dynchart::chart::ChartKind;

fn wrap(body: &str) -> String {
    format!("(function () {{\nvar __DynamicChart;\n{body}\nreturn __DynamicChart;\n}})()")
}

fn render(body: &str) -> Result<ElementTree, EvalError> {
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let component = sandbox.evaluate(&wrap(body))?;
    sandbox.instantiate(&component, &serde_json::Map::new())
}

/// Text content of the first `<p>` the component renders.
fn paragraph(body: &str) -> String {
    let tree = render(body).expect("render");
    match &tree.nodes[0] {
        ChartNode::Element(element) => element.text_content(),
        ChartNode::Text(text) => text.clone(),
    }
}

#[test]
fn ambient_host_globals_are_denied() {
    for name in ["window", "fetch", "document", "localStorage", "eval", "Function"] {
        assert!(DENIED_GLOBALS.contains(&name), "{name} should be on the deny list");
        let body = format!("function __DynamicChart() {{ return {name}; }}");
        let err = render(&body).expect_err("denied");
        assert_eq!(
            err,
            EvalError::CapabilityDenied {
                name: name.to_owned()
            }
        );
    }
}

#[test]
fn denied_names_can_be_shadowed_locally() {
    let text = paragraph("function __DynamicChart() { const window = 'ok'; return <p>{window}</p>; }");
    assert_eq!(text, "ok");
}

#[test]
fn top_level_access_fails_during_evaluation() {
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let err = sandbox
        .evaluate(&wrap("fetch('/api/vendas');\nfunction __DynamicChart() { return null; }"))
        .expect_err("denied at top level");
    assert!(matches!(err, EvalError::CapabilityDenied { .. }));
}

#[test]
fn math_has_no_random_source() {
    let err = render("function __DynamicChart() { return <p>{Math.random()}</p>; }")
        .expect_err("random unavailable");
    assert!(matches!(err, EvalError::Type(_)));
    assert_eq!(
        paragraph("function __DynamicChart() { return <p>{Math.max(3, 9, 4)}</p>; }"),
        "9"
    );
}

#[test]
fn infinite_loops_exhaust_the_step_budget() {
    let limits = EvalLimits {
        step_budget: 5_000,
        ..EvalLimits::default()
    };
    let mut sandbox = Sandbox::new("React", "Recharts", limits);
    let err = sandbox
        .evaluate(&wrap("while (true) {}\nfunction __DynamicChart() { return null; }"))
        .expect_err("budget");
    assert_eq!(err, EvalError::StepBudgetExhausted { budget: 5_000 });
}

#[test]
fn unbounded_recursion_hits_the_depth_limit() {
    let err = render("function f(n) { return f(n + 1); }\nfunction __DynamicChart() { f(0); return null; }")
        .expect_err("depth");
    assert_eq!(err, EvalError::CallDepthExceeded { limit: 64 });
}

#[test]
fn syntax_errors_report_positions() {
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let err = sandbox.evaluate("(function () {\n  const = 3;\n})()").expect_err("syntax");
    assert!(matches!(err, EvalError::Syntax { line: 2, .. }));
}

#[test]
fn unknown_namespace_members_are_invalid_element_types() {
    let err = render("function __DynamicChart() { return <Recharts.ScatterChart />; }")
        .expect_err("unknown member");
    assert!(matches!(err, EvalError::InvalidElementType { .. }));
}

#[test]
fn data_shaping_idioms_work() {
    let text = paragraph(
        r#"
const vendas = [
  { regiao: 'Sul', total: 1200.5 },
  { regiao: 'Norte', total: 300 },
  { regiao: 'Sudeste', total: 5400 },
];
function __DynamicChart() {
  const ordenadas = [...vendas].sort((a, b) => b.total - a.total);
  const soma = vendas.reduce((acc, { total }) => acc + total, 0);
  const nomes = ordenadas.filter((v) => v.total > 500).map((v) => v.regiao).join(', ');
  return <p>{`${nomes} | ${soma.toFixed(1)} | ${ordenadas[0]?.regiao ?? '-'}`}</p>;
}
"#,
    );
    assert_eq!(text, "Sudeste, Sul | 6900.5 | Sudeste");
}

#[test]
fn locale_formatting_defaults_to_brazilian_portuguese() {
    let text = paragraph(
        r#"function __DynamicChart() {
  const brl = (1234.5).toLocaleString('pt-BR', { style: 'currency', currency: 'BRL' });
  const usd = (1234.5).toLocaleString('en-US', { style: 'currency', currency: 'USD' });
  return <p>{brl} / {usd}</p>;
}"#,
    );
    assert_eq!(text, "R$ 1.234,50 / $1,234.50");
}

#[test]
fn hooks_return_static_values() {
    let text = paragraph(
        r#"function __DynamicChart() {
  const [ativo, setAtivo] = React.useState('receita');
  const dobro = React.useMemo(() => 21 * 2, []);
  React.useEffect(() => { setAtivo('custo'); }, []);
  return <p>{ativo}-{dobro}</p>;
}"#,
    );
    assert_eq!(text, "receita-42");
}

#[test]
fn props_reach_the_component() {
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let component = sandbox
        .evaluate(&wrap("function __DynamicChart({ titulo }) { return <h2>{titulo}</h2>; }"))
        .expect("component");
    let mut props = serde_json::Map::new();
    props.insert("titulo".to_owned(), serde_json::json!("Resumo"));
    let tree = sandbox.instantiate(&component, &props).expect("tree");
    let ChartNode::Element(heading) = &tree.nodes[0] else {
        panic!("expected heading");
    };
    assert_eq!(heading.kind, ElementKind::Intrinsic("h2".to_owned()));
    assert_eq!(heading.text_content(), "Resumo");
}

#[test]
fn callbacks_run_after_instantiation() {
    let mut tree = render(
        r#"function __DynamicChart() {
  const moeda = (v) => `R$ ${Number(v).toLocaleString('pt-BR')}`;
  return (
    <Recharts.BarChart data={[{ v: 1500 }]}>
      <Recharts.YAxis tickFormatter={moeda} />
      <Recharts.Bar dataKey="v" />
    </Recharts.BarChart>
  );
}"#,
    )
    .expect("tree");
    let axis = tree.find(ChartKind::YAxis).expect("axis");
    let id = axis
        .prop("tickFormatter")
        .and_then(PropValue::callback)
        .expect("callback");
    assert_eq!(
        tree.callbacks.format(id, &[serde_json::json!(1500)]).expect("format"),
        "R$ 1.500"
    );
}

fn mount(source: &str) -> RenderTarget {
    let config = RendererConfig::default();
    let mut target = RenderTarget::new(MessageId::from("m1"), &config);
    target.render(source, &mut Sandbox::from_config(&config));
    target
}

#[test]
fn deeply_nested_sources_fail_instead_of_overflowing() {
    let depth = 5_000;
    let sources = [
        format!(
            "export default function A() {{ return {}1{}; }}",
            "(".repeat(depth),
            ")".repeat(depth)
        ),
        format!(
            "export default function A() {{ return {}{}; }}",
            "<g>".repeat(depth),
            "</g>".repeat(depth)
        ),
        format!(
            "export default function A() {{ return {}; }}",
            vec!["1"; depth].join(" + ")
        ),
        format!("export default function A() {{ return {}x; }}", "!".repeat(depth)),
        format!(
            "export default function A() {{ {} return null; {} }}",
            "{".repeat(depth),
            "}".repeat(depth)
        ),
    ];
    for source in &sources {
        let target = mount(source);
        assert_eq!(target.state(), RenderState::Failed);
        assert!(
            target
                .container()
                .error_text()
                .is_some_and(|text| text.contains("nests deeper")),
            "{:?}",
            target.container().error_text()
        );
    }
}

#[test]
fn cyclic_values_fail_cleanly() {
    let err = render(
        "const data = [{ v: 1 }];\ndata[0].self = data;\n\
         function __DynamicChart() { return <Recharts.LineChart data={data} />; }",
    )
    .expect_err("cyclic prop");
    assert!(matches!(&err, EvalError::Type(message) if message.contains("circular")), "{err}");

    let err = render(
        "function __DynamicChart() { const o = {}; o.o = o; return <p>{JSON.stringify(o)}</p>; }",
    )
    .expect_err("cyclic stringify");
    assert!(matches!(err, EvalError::Type(_)));

    assert_eq!(
        paragraph("function __DynamicChart() { const a = [1]; a.push(a); return <p>{'x' + a}</p>; }"),
        "x1,"
    );
    assert_eq!(
        paragraph("function __DynamicChart() { const a = []; a.push(a); return <p>{a.join('-') + '!'}</p>; }"),
        "!"
    );
}

#[test]
fn string_blow_up_is_bounded() {
    let growth = [
        "let s = 'ab'; for (let i = 0; i < 40; i++) s = s + s;",
        "let s = 'ab'; for (let i = 0; i < 40; i++) s += `${s}`;",
        "let s = 'ab'; for (let i = 0; i < 40; i++) s = [s, s].join('');",
        "const s = 'x'.repeat(1e9);",
        "const s = 'x'.padStart(2147483647);",
        "const a = 'a'.repeat(2000); const s = a.replaceAll('a', a);",
    ];
    for statement in growth {
        let body = format!("function __DynamicChart() {{ {statement} return <p>{{s.length}}</p>; }}");
        let err = render(&body).expect_err(statement);
        assert!(
            matches!(err, EvalError::Runtime(_) | EvalError::StepBudgetExhausted { .. }),
            "{statement}: {err}"
        );
    }
    assert_eq!(
        paragraph("function __DynamicChart() { let s = 'ab'; for (let i = 0; i < 10; i++) s = s + s; return <p>{s.length}</p>; }"),
        "2048"
    );
}

#[test]
fn element_fan_out_is_charged() {
    let err = render(
        "function __DynamicChart() {\n\
         let x = <p>a</p>;\n\
         for (let i = 0; i < 60; i++) x = <g>{x}{x}</g>;\n\
         return x;\n}",
    )
    .expect_err("exponential tree");
    assert!(matches!(
        err,
        EvalError::StepBudgetExhausted { .. } | EvalError::CallDepthExceeded { .. }
    ));
}
