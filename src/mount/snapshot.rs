use serde::{Deserialize, Serialize};

use crate::error::{ChartError, ChartResult};

use super::container::ContainerStats;
use super::target::{RenderState, RenderTarget};
use super::ticket::MessageId;

pub const TARGET_SNAPSHOT_JSON_SCHEMA_V1: u32 = 1;

/// Serializable view of one render target for diagnostics and regression
/// tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub message_id: MessageId,
    pub state: RenderState,
    pub generation: u64,
    pub source_len: usize,
    pub mounted_generation: Option<u64>,
    pub primitive_count: usize,
    pub error_text: Option<String>,
    pub diagnostics: Vec<String>,
    pub stats: ContainerStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshotJsonContractV1 {
    pub schema_version: u32,
    pub snapshot: TargetSnapshot,
}

impl TargetSnapshot {
    #[must_use]
    pub fn of(target: &RenderTarget) -> Self {
        let container = target.container();
        let root = container.chart_root();
        Self {
            message_id: target.message_id().clone(),
            state: target.state(),
            generation: target.generation(),
            source_len: target.source().map_or(0, |source| source.len()),
            mounted_generation: root.map(|root| root.generation()),
            primitive_count: root.map_or(0, |root| root.frame().primitive_count()),
            error_text: container.error_text().map(str::to_owned),
            diagnostics: target
                .diagnostics()
                .iter()
                .map(ToString::to_string)
                .collect(),
            stats: container.stats(),
        }
    }

    pub fn to_json_contract_v1_pretty(&self) -> ChartResult<String> {
        let payload = TargetSnapshotJsonContractV1 {
            schema_version: TARGET_SNAPSHOT_JSON_SCHEMA_V1,
            snapshot: self.clone(),
        };
        serde_json::to_string_pretty(&payload).map_err(|e| {
            ChartError::InvalidData(format!("failed to serialize target snapshot contract v1: {e}"))
        })
    }

    pub fn from_json_compat_str(input: &str) -> ChartResult<Self> {
        if let Ok(snapshot) = serde_json::from_str::<Self>(input) {
            return Ok(snapshot);
        }
        let payload: TargetSnapshotJsonContractV1 = serde_json::from_str(input).map_err(|e| {
            ChartError::InvalidData(format!("failed to parse target snapshot json payload: {e}"))
        })?;
        if payload.schema_version != TARGET_SNAPSHOT_JSON_SCHEMA_V1 {
            return Err(ChartError::InvalidData(format!(
                "unsupported target snapshot schema version: {}",
                payload.schema_version
            )));
        }
        Ok(payload.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::sandbox::Sandbox;

    #[test]
    fn contract_round_trips_and_rejects_unknown_versions() {
        let mut target = RenderTarget::new(MessageId::from("m9"), &RendererConfig::default());
        target.render("export default Nada;", &mut Sandbox::from_config(&RendererConfig::default()));
        let snapshot = TargetSnapshot::of(&target);
        assert_eq!(snapshot.state, RenderState::Failed);
        assert!(snapshot.error_text.is_some());

        let json = snapshot.to_json_contract_v1_pretty().expect("json");
        assert_eq!(TargetSnapshot::from_json_compat_str(&json).expect("parse"), snapshot);

        let future = json.replace("\"schema_version\": 1", "\"schema_version\": 2");
        assert!(TargetSnapshot::from_json_compat_str(&future).is_err());
    }
}
