use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::render::RenderFrame;

/// A mounted chart: the laid-out frame of one render generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRoot {
    generation: u64,
    frame: RenderFrame,
}

impl RenderRoot {
    #[must_use]
    pub fn new(generation: u64, frame: RenderFrame) -> Self {
        Self { generation, frame }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn frame(&self) -> &RenderFrame {
        &self.frame
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayNode {
    ChartRoot(RenderRoot),
    /// Inline failure text shown in place of the chart.
    ErrorText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerStats {
    pub mounts: u64,
    pub releases: u64,
    pub errors_shown: u64,
}

impl ContainerStats {
    /// Roots mounted and not yet released.
    #[must_use]
    pub fn live_roots(self) -> u64 {
        self.mounts - self.releases
    }
}

/// Display surface owned by one render target. Every mount clears the
/// previous content first, so at most one chart root is ever live.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    nodes: Vec<DisplayNode>,
    stats: ContainerStats,
}

impl Container {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn nodes(&self) -> &[DisplayNode] {
        &self.nodes
    }

    #[must_use]
    pub fn stats(&self) -> ContainerStats {
        self.stats
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The mounted chart root, if any.
    #[must_use]
    pub fn chart_root(&self) -> Option<&RenderRoot> {
        self.nodes.iter().find_map(|node| match node {
            DisplayNode::ChartRoot(root) => Some(root),
            DisplayNode::ErrorText(_) => None,
        })
    }

    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.nodes.iter().find_map(|node| match node {
            DisplayNode::ErrorText(text) => Some(text.as_str()),
            DisplayNode::ChartRoot(_) => None,
        })
    }

    /// Removes all content, releasing any mounted root. Returns the number of
    /// roots released.
    pub fn clear(&mut self) -> usize {
        let released = self
            .nodes
            .drain(..)
            .filter(|node| matches!(node, DisplayNode::ChartRoot(_)))
            .count();
        self.stats.releases += released as u64;
        if released > 0 {
            trace!(released, "container released chart root");
        }
        released
    }

    pub fn mount(&mut self, root: RenderRoot) {
        self.clear();
        self.nodes.push(DisplayNode::ChartRoot(root));
        self.stats.mounts += 1;
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.clear();
        self.nodes.push(DisplayNode::ErrorText(text.into()));
        self.stats.errors_shown += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Viewport;

    fn root(generation: u64) -> RenderRoot {
        RenderRoot::new(generation, RenderFrame::new(Viewport::new(10, 10)))
    }

    #[test]
    fn mounting_replaces_the_previous_root() {
        let mut container = Container::new();
        container.mount(root(1));
        container.mount(root(2));
        assert_eq!(container.nodes().len(), 1);
        assert_eq!(container.chart_root().map(RenderRoot::generation), Some(2));
        assert_eq!(container.stats().live_roots(), 1);
    }

    #[test]
    fn error_text_releases_chart() {
        let mut container = Container::new();
        container.mount(root(1));
        container.show_error("Erro ao renderizar gráfico: boom");
        assert!(container.chart_root().is_none());
        assert_eq!(container.error_text(), Some("Erro ao renderizar gráfico: boom"));
        assert_eq!(container.stats().live_roots(), 0);
        assert_eq!(container.clear(), 0);
    }
}
