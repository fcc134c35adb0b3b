use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::chart::build_frame;
use crate::config::RendererConfig;
use crate::core::Viewport;
use crate::error::{ChartError, TransformError};
use crate::render::Color;
use crate::sandbox::{EvalJob, EvalResult, Sandbox};
use crate::transform::SourceTransformer;

use super::container::{Container, RenderRoot};
use super::ticket::{ChartSource, MessageId, RenderTicket};

/// Prefix of the inline text shown when a chart cannot be rendered.
pub const RENDER_ERROR_PREFIX: &str = "Erro ao renderizar gráfico";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderState {
    Idle,
    Transforming,
    Evaluating,
    Mounted,
    /// Idle with an inline error shown.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Mounted { generation: u64 },
    /// Failure text now shown in the container.
    Failed { message: String },
    /// A newer submission superseded this result; nothing changed.
    Stale,
    /// The submitted source matches the one already rendered.
    Unchanged,
}

/// Mounting point of one chat message's chart.
///
/// The pipeline is split into `submit`, `begin_evaluation`, evaluation by a
/// [`Sandbox`] and `commit` so hosts can interleave stages; only results whose
/// ticket carries the current generation are ever committed.
#[derive(Debug)]
pub struct RenderTarget {
    message_id: MessageId,
    transformer: SourceTransformer,
    viewport: Viewport,
    background: Color,
    source: Option<ChartSource>,
    generation: u64,
    state: RenderState,
    container: Container,
    diagnostics: Vec<TransformError>,
}

impl RenderTarget {
    #[must_use]
    pub fn new(message_id: MessageId, config: &RendererConfig) -> Self {
        Self {
            message_id,
            transformer: SourceTransformer::new(config.transform.clone()),
            viewport: config.viewport,
            background: config.background,
            source: None,
            generation: 0,
            state: RenderState::Idle,
            container: Container::new(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    #[must_use]
    pub fn state(&self) -> RenderState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn source(&self) -> Option<&ChartSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Diagnostics recovered while transforming the current source.
    #[must_use]
    pub fn diagnostics(&self) -> &[TransformError] {
        &self.diagnostics
    }

    fn ticket(&self) -> RenderTicket {
        RenderTicket {
            message_id: self.message_id.clone(),
            generation: self.generation,
        }
    }

    fn is_current(&self, ticket: &RenderTicket) -> bool {
        ticket.message_id == self.message_id && ticket.generation == self.generation
    }

    /// Starts a render of `source`. Returns `None` when the content equals
    /// the source already submitted; otherwise the previous tree is torn down
    /// and earlier in-flight work becomes stale.
    pub fn submit(&mut self, source: impl Into<ChartSource>) -> Option<RenderTicket> {
        let source = source.into();
        if self.source.as_ref() == Some(&source) {
            trace!(message_id = %self.message_id, "chart source unchanged");
            return None;
        }
        self.container.clear();
        self.generation += 1;
        self.source = Some(source);
        self.diagnostics.clear();
        self.state = RenderState::Transforming;
        debug!(
            message_id = %self.message_id,
            generation = self.generation,
            "chart render submitted"
        );
        Some(self.ticket())
    }

    /// Transforms the current source and hands out the evaluation job, or
    /// `None` when `ticket` has been superseded.
    pub fn begin_evaluation(&mut self, ticket: &RenderTicket) -> Option<EvalJob> {
        if !self.is_current(ticket) || self.state != RenderState::Transforming {
            debug!(
                message_id = %self.message_id,
                generation = ticket.generation,
                current = self.generation,
                "stale render ticket skipped"
            );
            return None;
        }
        let source = self.source.as_ref()?;
        let output = self.transformer.transform(source.as_str());
        self.diagnostics = output.diagnostics;
        self.state = RenderState::Evaluating;
        Some(EvalJob {
            ticket: ticket.clone(),
            code: output.code,
        })
    }

    /// Applies an evaluation result: mounts the chart, or shows the failure
    /// inline. Results for superseded generations change nothing.
    pub fn commit(&mut self, result: EvalResult) -> CommitOutcome {
        if !self.is_current(&result.ticket) || self.state != RenderState::Evaluating {
            debug!(
                message_id = %self.message_id,
                generation = result.ticket.generation,
                current = self.generation,
                "stale evaluation result discarded"
            );
            return CommitOutcome::Stale;
        }

        let frame = result
            .outcome
            .map_err(ChartError::from)
            .and_then(|mut tree| build_frame(&mut tree, self.viewport, self.background));
        match frame {
            Ok(frame) => {
                let primitives = frame.primitive_count();
                self.container.mount(RenderRoot::new(self.generation, frame));
                self.state = RenderState::Mounted;
                debug!(
                    message_id = %self.message_id,
                    generation = self.generation,
                    primitives,
                    "chart mounted"
                );
                CommitOutcome::Mounted {
                    generation: self.generation,
                }
            }
            Err(err) => {
                let message = format!("{RENDER_ERROR_PREFIX}: {err}");
                warn!(
                    message_id = %self.message_id,
                    generation = self.generation,
                    error = %err,
                    "chart render failed"
                );
                self.container.show_error(message.clone());
                self.state = RenderState::Failed;
                CommitOutcome::Failed { message }
            }
        }
    }

    /// Runs every stage back to back.
    pub fn render(&mut self, source: impl Into<ChartSource>, sandbox: &mut Sandbox) -> CommitOutcome {
        let Some(ticket) = self.submit(source) else {
            return CommitOutcome::Unchanged;
        };
        let Some(job) = self.begin_evaluation(&ticket) else {
            return CommitOutcome::Stale;
        };
        let result = sandbox.run_job(job);
        self.commit(result)
    }

    /// Releases the mounted tree and forgets the source. Safe to call any
    /// number of times.
    pub fn teardown(&mut self) {
        if self.state == RenderState::Idle && self.source.is_none() && self.container.is_empty() {
            return;
        }
        let released = self.container.clear();
        // In-flight work for the old generation must not mount afterwards.
        self.generation += 1;
        self.source = None;
        self.diagnostics.clear();
        self.state = RenderState::Idle;
        trace!(message_id = %self.message_id, released, "render target torn down");
    }
}
