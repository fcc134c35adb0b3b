use dynchart::config::RendererConfig;
use dynchart::mount::{
    ChartBoard, ChatMessage, CommitOutcome, MessageId, RENDER_ERROR_PREFIX, RenderState,
    RenderTarget, TargetSnapshot,
};
use dynchart::sandbox::Sandbox;

fn line_chart(points: &[f64]) -> String {
    let data = points
        .iter()
        .enumerate()
        .map(|(index, value)| format!("{{ dia: 'D{index}', valor: {value} }}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r##"import React from 'react';
import {{ LineChart, Line, XAxis, YAxis, CartesianGrid, Tooltip, ResponsiveContainer }} from 'recharts';

const data = [{data}];

export default function Evolucao() {{
  return (
    <ResponsiveContainer width="100%" height={{300}}>
      <LineChart data={{data}} margin={{{{ top: 10, right: 20, bottom: 5, left: 0 }}}}>
        <CartesianGrid strokeDasharray="3 3" />
        <XAxis dataKey="dia" />
        <YAxis />
        <Tooltip />
        <Line type="monotone" dataKey="valor" stroke="#8884d8" />
      </LineChart>
    </ResponsiveContainer>
  );
}}
"##
    )
}

fn target() -> (RenderTarget, Sandbox) {
    let config = RendererConfig::default();
    (
        RenderTarget::new(MessageId::from("msg-1"), &config),
        Sandbox::from_config(&config),
    )
}

#[test]
fn source_without_export_fails_without_panicking() {
    let (mut target, mut sandbox) = target();
    let outcome = target.render(
        "import { LineChart } from 'recharts';\nfunction Grafico() { return <LineChart />; }",
        &mut sandbox,
    );
    let CommitOutcome::Failed { message } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.starts_with(RENDER_ERROR_PREFIX));
    assert!(message.contains("did not produce a component"));
    assert_eq!(target.state(), RenderState::Failed);
    assert!(target.container().chart_root().is_none());
}

#[test]
fn rerendering_keeps_exactly_one_live_tree() {
    let (mut target, mut sandbox) = target();
    for round in 1..=5_u32 {
        let values: Vec<f64> = (0..4).map(|i| f64::from(i * round)).collect();
        let outcome = target.render(line_chart(&values), &mut sandbox);
        assert_eq!(
            outcome,
            CommitOutcome::Mounted {
                generation: u64::from(round)
            }
        );
        let stats = target.container().stats();
        assert_eq!(stats.live_roots(), 1);
        assert_eq!(target.container().nodes().len(), 1);
    }
    assert_eq!(target.container().stats().mounts, 5);
    assert_eq!(target.container().stats().releases, 4);
}

#[test]
fn failure_after_success_replaces_the_chart() {
    let (mut target, mut sandbox) = target();
    target.render(line_chart(&[1.0, 2.0]), &mut sandbox);
    let outcome = target.render("export default Inexistente;", &mut sandbox);
    assert!(matches!(outcome, CommitOutcome::Failed { .. }));
    assert!(target.container().chart_root().is_none());
    assert_eq!(target.container().stats().live_roots(), 0);

    // Recovers on the next good source.
    let outcome = target.render(line_chart(&[3.0, 1.0]), &mut sandbox);
    assert!(matches!(outcome, CommitOutcome::Mounted { .. }));
}

#[test]
fn rapid_updates_only_mount_the_latest_source() {
    let (mut target, mut sandbox) = target();
    let sources: Vec<String> = (1..=4).map(|n| line_chart(&[f64::from(n); 3])).collect();

    // Every update is submitted and evaluated before any result commits.
    let mut results = Vec::new();
    for source in &sources {
        let ticket = target.submit(source.as_str()).expect("ticket");
        let job = target.begin_evaluation(&ticket).expect("job");
        results.push(sandbox.run_job(job));
    }
    let latest_generation = results.last().expect("results").ticket.generation;

    let outcomes: Vec<CommitOutcome> = results
        .into_iter()
        .map(|result| target.commit(result))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            CommitOutcome::Stale,
            CommitOutcome::Stale,
            CommitOutcome::Stale,
            CommitOutcome::Mounted {
                generation: latest_generation
            },
        ]
    );
    let root = target.container().chart_root().expect("mounted");
    assert_eq!(root.generation(), latest_generation);
    assert_eq!(target.container().stats().mounts, 1);
    assert_eq!(
        target.source().map(|source| source.as_str()),
        Some(sources[3].as_str())
    );
}

#[test]
fn late_results_of_older_generations_are_ignored_after_mount() {
    let (mut target, mut sandbox) = target();
    let old_ticket = target.submit(line_chart(&[1.0])).expect("ticket");
    let old_job = target.begin_evaluation(&old_ticket).expect("job");
    let old_result = sandbox.run_job(old_job);

    target.render(line_chart(&[9.0, 8.0]), &mut sandbox);
    assert_eq!(target.commit(old_result), CommitOutcome::Stale);
    assert_eq!(target.container().chart_root().map(|r| r.generation()), Some(2));
}

#[test]
fn board_follows_the_conversation() {
    let mut board = ChartBoard::new(RendererConfig::default()).expect("board");
    let mut messages = vec![
        ChatMessage::assistant("a1", "Evolução diária").with_chart_code(line_chart(&[1.0, 2.0])),
        ChatMessage::assistant("a2", "Texto apenas"),
        ChatMessage::assistant("a3", "Outro gráfico").with_chart_code(line_chart(&[5.0, 1.0])),
    ];
    let outcomes = board.sync(&messages);
    assert_eq!(outcomes.len(), 2);
    assert_eq!(board.len(), 2);

    // Re-syncing unchanged content does not re-render.
    let outcomes = board.sync(&messages);
    assert!(outcomes.iter().all(|(_, outcome)| *outcome == CommitOutcome::Unchanged));

    // Edited chart re-renders; removed message tears its target down.
    messages[0].chart_code = Some(line_chart(&[7.0, 7.0, 7.0]));
    messages.remove(2);
    let outcomes = board.sync(&messages);
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].1, CommitOutcome::Mounted { generation: 2 }));
    assert!(board.target(&MessageId::from("a3")).is_none());

    let snapshot: Vec<TargetSnapshot> = board.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, RenderState::Mounted);
    assert!(snapshot[0].primitive_count > 0);

    board.clear();
    assert!(board.is_empty());
}

#[test]
fn board_rejects_invalid_config() {
    let config = RendererConfig::default().with_namespace("React");
    assert!(ChartBoard::new(config).is_err());
}
