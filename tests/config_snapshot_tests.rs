use dynchart::config::{EvalLimits, RendererConfig};
use dynchart::core::Viewport;
use dynchart::error::ChartError;
use dynchart::mount::{ChartBoard, ChatMessage, RenderState, TargetSnapshot};

#[test]
fn renderer_config_json_roundtrip() {
    let config = RendererConfig::new(Viewport::new(1024, 512))
        .with_runtime_name("R")
        .with_namespace("Charts")
        .with_limits(EvalLimits {
            step_budget: 50_000,
            max_call_depth: 32,
            ..EvalLimits::default()
        })
        .with_export_file_name("relatorio.png");

    let json = config.to_json_pretty().expect("config should serialize");
    let restored = RendererConfig::from_json_str(&json).expect("config should deserialize");
    assert_eq!(restored, config);
}

#[test]
fn invalid_configs_are_rejected_with_field_names() {
    let cases = [
        (r#"{ "viewport": { "width": 0, "height": 300 } }"#, None),
        (r#"{ "runtime_name": "1React" }"#, Some("runtime_name")),
        (
            r#"{ "transform": { "component_name": "my-chart" } }"#,
            Some("transform.component_name"),
        ),
        (r#"{ "limits": { "step_budget": 0 } }"#, Some("limits")),
        (r#"{ "export_file_name": "a/b.png" }"#, Some("bare file name")),
        (
            r#"{ "background": { "red": 2.0, "green": 0.0, "blue": 0.0, "alpha": 1.0 } }"#,
            Some("red"),
        ),
    ];
    for (input, needle) in cases {
        let err = RendererConfig::from_json_str(input).expect_err(input);
        if let Some(needle) = needle {
            assert!(err.to_string().contains(needle), "{input}: {err}");
        } else {
            assert!(matches!(err, ChartError::InvalidViewport { .. }));
        }
    }
    assert!(RendererConfig::from_json_str("{ not json").is_err());
}

#[test]
fn board_snapshot_serializes_through_the_versioned_contract() {
    let mut board = ChartBoard::new(RendererConfig::default()).expect("board");
    board.sync(&[
        ChatMessage::assistant("ok", "").with_chart_code(
            "import { AreaChart, Area } from 'recharts';\n\
             export default function A() { return <AreaChart data={[{ v: 1 }, { v: 2 }]}><Area dataKey=\"v\" /></AreaChart>; }",
        ),
        ChatMessage::assistant("erro", "").with_chart_code("export default function B() { return fetch; }"),
    ]);

    let snapshots = board.snapshot();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].state, RenderState::Mounted);
    assert_eq!(snapshots[0].mounted_generation, Some(1));
    assert_eq!(snapshots[1].state, RenderState::Failed);
    assert!(
        snapshots[1]
            .error_text
            .as_deref()
            .is_some_and(|text| text.contains("fetch"))
    );

    for snapshot in &snapshots {
        let json = snapshot.to_json_contract_v1_pretty().expect("json");
        assert!(json.contains("\"schema_version\": 1"));
        assert_eq!(&TargetSnapshot::from_json_compat_str(&json).expect("parse"), snapshot);
    }

    // Bare snapshots without the envelope are still accepted.
    let bare = serde_json::to_string(&snapshots[0]).expect("bare json");
    assert_eq!(TargetSnapshot::from_json_compat_str(&bare).expect("parse"), snapshots[0]);
}

#[test]
fn chat_messages_accept_camel_case_chart_code() {
    let message: ChatMessage = serde_json::from_str(
        r#"{ "id": "m1", "role": "assistant", "content": "Veja", "chartCode": "export default X;" }"#,
    )
    .expect("message");
    assert_eq!(message.chart_code.as_deref(), Some("export default X;"));
    assert_eq!(message.id.as_str(), "m1");
}

#[test]
fn default_tracing_is_opt_in() {
    if !cfg!(feature = "telemetry") {
        assert!(!dynchart::telemetry::init_default_tracing());
    }
}
