use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RendererConfig;
use crate::error::{ChartResult, ExportError};
use crate::export::{DownloadSink, ExportReceipt, export_as_image};
use crate::render::PngRenderer;
use crate::sandbox::Sandbox;

use super::snapshot::TargetSnapshot;
use super::target::{CommitOutcome, RenderTarget};
use super::ticket::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Chat message as delivered by the assistant service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "chartCode")]
    pub chart_code: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn assistant(id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            chart_code: None,
        }
    }

    #[must_use]
    pub fn with_chart_code(mut self, code: impl Into<String>) -> Self {
        self.chart_code = Some(code.into());
        self
    }
}

/// Render targets of one chat session, keyed by message id in arrival order.
#[derive(Debug)]
pub struct ChartBoard {
    config: RendererConfig,
    sandbox: Sandbox,
    targets: IndexMap<MessageId, RenderTarget>,
}

impl ChartBoard {
    pub fn new(config: RendererConfig) -> ChartResult<Self> {
        config.validate()?;
        Ok(Self {
            sandbox: Sandbox::from_config(&config),
            config,
            targets: IndexMap::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[must_use]
    pub fn target(&self, id: &MessageId) -> Option<&RenderTarget> {
        self.targets.get(id)
    }

    pub fn targets(&self) -> impl Iterator<Item = &RenderTarget> {
        self.targets.values()
    }

    /// Renders the chart of `message`, creating its target on first sight.
    /// A message without chart code drops any target it had.
    pub fn sync_message(&mut self, message: &ChatMessage) -> Option<CommitOutcome> {
        let Some(code) = message.chart_code.as_deref() else {
            self.remove(&message.id);
            return None;
        };
        let target = self
            .targets
            .entry(message.id.clone())
            .or_insert_with(|| RenderTarget::new(message.id.clone(), &self.config));
        Some(target.render(code, &mut self.sandbox))
    }

    /// Brings the board in line with the current message list: renders new or
    /// changed charts and tears down targets whose messages are gone.
    pub fn sync(&mut self, messages: &[ChatMessage]) -> Vec<(MessageId, CommitOutcome)> {
        let gone: Vec<MessageId> = self
            .targets
            .keys()
            .filter(|id| !messages.iter().any(|message| &message.id == *id))
            .cloned()
            .collect();
        for id in &gone {
            self.remove(id);
        }

        messages
            .iter()
            .filter_map(|message| {
                self.sync_message(message)
                    .map(|outcome| (message.id.clone(), outcome))
            })
            .collect()
    }

    /// Tears down and forgets the target of `id`.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        match self.targets.shift_remove(id) {
            Some(mut target) => {
                target.teardown();
                debug!(message_id = %id, "render target removed");
                true
            }
            None => false,
        }
    }

    /// Ends the session: every target is torn down.
    pub fn clear(&mut self) {
        for target in self.targets.values_mut() {
            target.teardown();
        }
        let removed = self.targets.len();
        self.targets.clear();
        debug!(removed, "chart board cleared");
    }

    /// Exports the chart mounted for `id` as a PNG download.
    pub fn export<R: PngRenderer>(
        &self,
        id: &MessageId,
        renderer: &mut R,
        sink: &mut dyn DownloadSink,
    ) -> Result<ExportReceipt, ExportError> {
        let target = self.targets.get(id).ok_or(ExportError::ChartNotFound)?;
        export_as_image(target.container(), renderer, sink, &self.config.export_file_name)
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<TargetSnapshot> {
        self.targets.values().map(TargetSnapshot::of).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE_SOURCE: &str = r#"import { LineChart, Line } from 'recharts';
const data = [{ v: 1 }, { v: 4 }, { v: 2 }];
export default function Tendencia() {
  return <LineChart data={data}><Line dataKey="v" /></LineChart>;
}"#;

    #[test]
    fn messages_deserialize_with_either_field_spelling() {
        let message: ChatMessage = serde_json::from_str(
            r#"{ "id": "a1", "role": "assistant", "content": "Veja", "chartCode": "x" }"#,
        )
        .expect("message");
        assert_eq!(message.chart_code.as_deref(), Some("x"));
        let message: ChatMessage =
            serde_json::from_str(r#"{ "id": "u1", "role": "user" }"#).expect("message");
        assert_eq!(message.chart_code, None);
        assert_eq!(message.role, Role::User);
    }

    #[test]
    fn sync_creates_and_removes_targets() {
        let mut board = ChartBoard::new(RendererConfig::default()).expect("board");
        let messages = vec![
            ChatMessage::assistant("a1", "Tendência").with_chart_code(LINE_SOURCE),
            ChatMessage::assistant("a2", "Sem gráfico"),
        ];
        let outcomes = board.sync(&messages);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, CommitOutcome::Mounted { .. }));
        assert_eq!(board.len(), 1);

        assert!(board.sync(&messages[1..]).is_empty());
        assert!(board.is_empty());
    }

    #[test]
    fn clear_tears_everything_down() {
        let mut board = ChartBoard::new(RendererConfig::default()).expect("board");
        board.sync_message(&ChatMessage::assistant("a1", "").with_chart_code(LINE_SOURCE));
        board.clear();
        assert!(board.is_empty());
        assert!(board.snapshot().is_empty());
    }
}
