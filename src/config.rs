use serde::{Deserialize, Serialize};

use crate::core::Viewport;
use crate::error::{ChartError, ChartResult};
use crate::render::Color;

pub const DEFAULT_RUNTIME_NAME: &str = "React";
pub const DEFAULT_NAMESPACE_NAME: &str = "Recharts";
pub const DEFAULT_RUNTIME_MODULE: &str = "react";
pub const DEFAULT_LIBRARY_MODULE: &str = "recharts";
pub const DEFAULT_COMPONENT_NAME: &str = "__DynamicChart";
pub const DEFAULT_EXPORT_FILE_NAME: &str = "grafico.png";

/// Names used by the source transformer when rewriting AI-authored source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub runtime_module: String,
    pub library_module: String,
    pub namespace: String,
    pub component_name: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            runtime_module: DEFAULT_RUNTIME_MODULE.to_owned(),
            library_module: DEFAULT_LIBRARY_MODULE.to_owned(),
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            component_name: DEFAULT_COMPONENT_NAME.to_owned(),
        }
    }
}

/// Execution bounds for the sandbox interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalLimits {
    /// Maximum number of interpreter steps for one evaluation or instantiation.
    pub step_budget: u64,
    /// Maximum nested function call depth.
    pub max_call_depth: usize,
    /// Maximum syntactic nesting of statements, expressions and JSX.
    pub max_nesting_depth: usize,
    /// Maximum recursion of the evaluator across nested calls.
    pub max_eval_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            step_budget: 200_000,
            max_call_depth: 64,
            max_nesting_depth: 128,
            max_eval_depth: 256,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub viewport: Viewport,
    pub runtime_name: String,
    pub transform: TransformOptions,
    pub limits: EvalLimits,
    pub export_file_name: String,
    pub background: Color,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(600, 300),
            runtime_name: DEFAULT_RUNTIME_NAME.to_owned(),
            transform: TransformOptions::default(),
            limits: EvalLimits::default(),
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_owned(),
            background: Color::rgb(1.0, 1.0, 1.0),
        }
    }
}

impl RendererConfig {
    #[must_use]
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.transform.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_runtime_name(mut self, runtime_name: impl Into<String>) -> Self {
        self.runtime_name = runtime_name.into();
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_export_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.export_file_name = file_name.into();
        self
    }

    pub fn validate(&self) -> ChartResult<()> {
        if !self.viewport.is_valid() {
            return Err(ChartError::InvalidViewport {
                width: self.viewport.width,
                height: self.viewport.height,
            });
        }
        for (field, value) in [
            ("runtime_name", self.runtime_name.as_str()),
            ("transform.namespace", self.transform.namespace.as_str()),
            (
                "transform.component_name",
                self.transform.component_name.as_str(),
            ),
        ] {
            if !is_identifier(value) {
                return Err(ChartError::InvalidConfig(format!(
                    "`{field}` must be a valid identifier, got `{value}`"
                )));
            }
        }
        if self.runtime_name == self.transform.namespace {
            return Err(ChartError::InvalidConfig(
                "runtime and namespace bindings must have distinct names".to_owned(),
            ));
        }
        if self.limits.step_budget == 0
            || self.limits.max_call_depth == 0
            || self.limits.max_nesting_depth == 0
            || self.limits.max_eval_depth == 0
        {
            return Err(ChartError::InvalidConfig(
                "evaluation limits must be > 0".to_owned(),
            ));
        }
        if self.export_file_name.trim().is_empty()
            || self.export_file_name.contains(['/', '\\'])
        {
            return Err(ChartError::InvalidConfig(format!(
                "export file name `{}` must be a bare file name",
                self.export_file_name
            )));
        }
        self.background.validate()
    }

    pub fn to_json_pretty(&self) -> ChartResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ChartError::InvalidConfig(format!("failed to serialize config: {e}")))
    }

    pub fn from_json_str(input: &str) -> ChartResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| ChartError::InvalidConfig(format!("failed to parse config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RendererConfig::default().validate().expect("defaults");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = RendererConfig::from_json_str(
            r#"{ "viewport": { "width": 800, "height": 400 }, "limits": { "step_budget": 10 } }"#,
        )
        .expect("config");
        assert_eq!(config.viewport, Viewport::new(800, 400));
        assert_eq!(config.limits.step_budget, 10);
        assert_eq!(config.limits.max_call_depth, 64);
        assert_eq!(config.transform.namespace, "Recharts");
    }

    #[test]
    fn rejects_clashing_binding_names() {
        let config = RendererConfig::default().with_namespace("React");
        assert!(matches!(
            config.validate(),
            Err(ChartError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_path_like_export_names() {
        let config = RendererConfig::default().with_export_file_name("../grafico.png");
        assert!(config.validate().is_err());
    }
}
