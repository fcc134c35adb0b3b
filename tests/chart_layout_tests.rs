use approx::assert_relative_eq;
use dynchart::chart::{ChartKind, build_frame, parse_color};
use dynchart::config::EvalLimits;
use dynchart::core::Viewport;
use dynchart::error::{ChartError, MountError};
use dynchart::render::{Color, LineStrokeStyle, RenderFrame, TextHAlign};
use dynchart::sandbox::Sandbox;
use dynchart::transform::SourceTransformer;

fn frame_for(source: &str) -> Result<RenderFrame, ChartError> {
    let out = SourceTransformer::default().transform(source);
    let mut sandbox = Sandbox::new("React", "Recharts", EvalLimits::default());
    let component = sandbox.evaluate(&out.code)?;
    let mut tree = sandbox.instantiate(&component, &serde_json::Map::new())?;
    build_frame(&mut tree, Viewport::new(600, 300), Color::rgb(1.0, 1.0, 1.0))
}

#[test]
fn bar_chart_with_formatted_axis_and_dashed_grid() {
    let source = r##"import { BarChart, Bar, XAxis, YAxis, CartesianGrid, Legend } from 'recharts';

const data = [
  { mes: 'Jan', receita: 4000, custo: 2400 },
  { mes: 'Fev', receita: 3000, custo: 1398 },
  { mes: 'Mar', receita: 2000, custo: 9800 },
];

export default function Comparativo() {
  const formatar = (v) => `R$ ${(v / 1000).toFixed(0)}k`;
  return (
    <div>
      <h3>Receita x Custo</h3>
      <BarChart data={data}>
        <CartesianGrid strokeDasharray="3 3" />
        <XAxis dataKey="mes" />
        <YAxis tickFormatter={formatar} />
        <Legend />
        <Bar dataKey="receita" name="Receita" fill="#8884d8" />
        <Bar dataKey="custo" name="Custo" fill="#82ca9d" />
      </BarChart>
    </div>
  );
}
"##;
    let frame = frame_for(source).expect("frame");
    frame.validate().expect("valid");

    assert_eq!(frame.texts[0].text, "Receita x Custo");
    // Six bars plus two legend swatches.
    assert_eq!(frame.rects.len(), 8);
    let texts: Vec<&str> = frame.texts.iter().map(|text| text.text.as_str()).collect();
    for expected in ["Jan", "Fev", "Mar", "Receita", "Custo", "R$ 0k", "R$ 10k"] {
        assert!(texts.contains(&expected), "missing label {expected}: {texts:?}");
    }
    assert!(frame
        .lines
        .iter()
        .any(|line| line.stroke_style == LineStrokeStyle::Dashed { on: 3.0, off: 3.0 }));
    assert!(frame
        .texts
        .iter()
        .filter(|text| text.text.starts_with("R$"))
        .all(|text| text.h_align == TextHAlign::Right));

    // Grouped bars of the same category do not overlap.
    let receita = parse_color("#8884d8").expect("color");
    let custo = parse_color("#82ca9d").expect("color");
    let first_receita = frame
        .rects
        .iter()
        .find(|rect| rect.fill_color == receita && rect.height > 0.0)
        .expect("receita bar");
    let first_custo = frame
        .rects
        .iter()
        .find(|rect| rect.fill_color == custo && rect.height > 12.0)
        .expect("custo bar");
    assert!(first_receita.x + first_receita.width <= first_custo.x + 1e-9);
}

#[test]
fn taller_values_produce_taller_bars() {
    let source = r#"import { BarChart, Bar } from 'recharts';
export default function B() {
  return <BarChart data={[{ v: 10 }, { v: 40 }]}><Bar dataKey="v" /></BarChart>;
}"#;
    let frame = frame_for(source).expect("frame");
    assert_eq!(frame.rects.len(), 2);
    let (small, large) = (frame.rects[0], frame.rects[1]);
    assert_relative_eq!(large.height / small.height, 4.0, epsilon = 1e-9);
    assert_relative_eq!(small.y + small.height, large.y + large.height, epsilon = 1e-9);
}

#[test]
fn composed_chart_mixes_series() {
    let source = r##"import { ComposedChart, Bar, Line, Area, XAxis } from 'recharts';
const data = [{ d: 'a', x: 1, y: 2, z: 3 }, { d: 'b', x: 2, y: 1, z: 4 }, { d: 'c', x: 3, y: 3, z: 2 }];
export default function Misto() {
  return (
    <ComposedChart data={data}>
      <XAxis dataKey="d" />
      <Area dataKey="z" fill="#ffc658" stroke="#ffc658" />
      <Bar dataKey="x" barSize={20} />
      <Line dataKey="y" dot={false} strokeWidth={3} />
    </ComposedChart>
  );
}"##;
    let frame = frame_for(source).expect("frame");
    assert_eq!(frame.polygons.len(), 1, "area fill without line dots");
    assert_eq!(frame.rects.len(), 3);
    assert!(frame.rects.iter().all(|rect| (rect.width - 20.0).abs() < 1e-9));
    assert_eq!(
        frame
            .lines
            .iter()
            .filter(|line| (line.stroke_width - 3.0).abs() < 1e-9)
            .count(),
        2
    );
}

#[test]
fn donut_uses_inner_radius() {
    let source = r#"import { PieChart, Pie } from 'recharts';
export default function Rosca() {
  return (
    <PieChart>
      <Pie data={[{ name: 'a', value: 1 }, { name: 'b', value: 1 }]} dataKey="value" innerRadius="50%" outerRadius="80%" />
    </PieChart>
  );
}"#;
    let frame = frame_for(source).expect("frame");
    assert_eq!(frame.polygons.len(), 2);
    let (cx, cy) = (300.0, 150.0);
    for polygon in &frame.polygons {
        // No vertex sits at the center of a donut.
        assert!(polygon
            .points
            .iter()
            .all(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt() > 10.0));
    }
}

#[test]
fn extreme_axis_and_angle_props_stay_bounded() {
    let bars = r#"import { BarChart, Bar, YAxis } from 'recharts';
export default function Ticks() {
  return (
    <BarChart data={[{ v: 1 }, { v: 5 }]}>
      <YAxis tickCount={1e12} />
      <Bar dataKey="v" />
    </BarChart>
  );
}"#;
    let frame = frame_for(bars).expect("frame");
    assert!(frame.texts.len() < 100, "{} tick labels", frame.texts.len());

    let pie = r#"import { PieChart, Pie } from 'recharts';
export default function Voltas() {
  return (
    <PieChart>
      <Pie data={[{ value: 1 }, { value: 3 }]} dataKey="value" startAngle={-1e13} endAngle={1e13} paddingAngle={1e300} />
    </PieChart>
  );
}"#;
    let frame = frame_for(pie).expect("frame");
    let vertices: usize = frame.polygons.iter().map(|polygon| polygon.points.len()).sum();
    assert!(vertices < 1_000, "{vertices} vertices");
}

#[test]
fn missing_data_and_missing_chart_are_mount_errors() {
    let no_data = r#"import { LineChart, Line } from 'recharts';
export default function Vazio() { return <LineChart data={[]}><Line dataKey="v" /></LineChart>; }"#;
    assert!(matches!(
        frame_for(no_data),
        Err(ChartError::Mount(MountError::NoData { ref chart })) if chart == "LineChart"
    ));

    let no_chart = "export default function Texto() { return <p>Sem gráfico hoje</p>; }";
    assert!(matches!(
        frame_for(no_chart),
        Err(ChartError::Mount(MountError::NoChart))
    ));

    let empty = "export default function Nada() { return null; }";
    assert!(matches!(
        frame_for(empty),
        Err(ChartError::Mount(MountError::EmptyTree))
    ));
}

#[test]
fn formatter_errors_surface_as_eval_errors() {
    let source = r#"import { LineChart, Line, XAxis } from 'recharts';
export default function Quebra() {
  return (
    <LineChart data={[{ d: 1, v: 2 }]}>
      <XAxis dataKey="d" tickFormatter={(v) => v.nao.existe} />
      <Line dataKey="v" />
    </LineChart>
  );
}"#;
    assert!(matches!(frame_for(source), Err(ChartError::Eval(_))));
}

#[test]
fn every_namespace_member_is_a_known_kind() {
    for name in [
        "ResponsiveContainer",
        "LineChart",
        "BarChart",
        "AreaChart",
        "ComposedChart",
        "PieChart",
        "Line",
        "Bar",
        "Area",
        "Pie",
        "Cell",
        "XAxis",
        "YAxis",
        "CartesianGrid",
        "Tooltip",
        "Legend",
    ] {
        assert!(ChartKind::from_name(name).is_some(), "{name}");
    }
}
