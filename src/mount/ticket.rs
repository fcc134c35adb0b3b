use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of the chat message a render target belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Chart component source of one message. Cheap to clone, compared by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartSource(Arc<str>);

impl ChartSource {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ChartSource {
    fn from(source: &str) -> Self {
        Self(Arc::from(source))
    }
}

impl From<String> for ChartSource {
    fn from(source: String) -> Self {
        Self(Arc::from(source))
    }
}

/// Identifies one submission of a render target. Work carrying a ticket whose
/// generation is no longer current is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderTicket {
    pub message_id: MessageId,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_compare_by_content() {
        let a = ChartSource::from("export default X;");
        let b = ChartSource::from(String::from("export default X;"));
        assert_eq!(a, b);
        assert_ne!(a, ChartSource::from("export default Y;"));
    }

    #[test]
    fn message_ids_serialize_as_plain_strings() {
        let id = MessageId::from("msg-7");
        assert_eq!(serde_json::to_string(&id).expect("json"), "\"msg-7\"");
        assert_eq!(id.to_string(), "msg-7");
    }
}
