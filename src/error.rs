use thiserror::Error;

pub type ChartResult<T> = Result<T, ChartError>;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid viewport size: width={width}, height={height}")]
    InvalidViewport { width: u32, height: u32 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Recovered rewrite problems reported by the source transformer.
///
/// These never abort a render: the wrapped closure still runs and any
/// resulting `undefined` is rejected by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("no named import from `{module}` found")]
    MissingLibraryImport { module: String },

    #[error("no default export found")]
    MissingDefaultExport,

    #[error("unsupported import from `{module}` was stripped")]
    StrayImport { module: String },

    #[error("multiple default exports found, using the first")]
    DuplicateDefaultExport,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("`{name}` is not available in the chart sandbox")]
    CapabilityDenied { name: String },

    #[error("{name} is not defined")]
    Reference { name: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("evaluated source did not produce a component (got {found})")]
    NotAComponent { found: String },

    #[error("element type is invalid: expected a string or a component but got {found}")]
    InvalidElementType { found: String },

    #[error("evaluation exceeded the step budget of {budget}")]
    StepBudgetExhausted { budget: u64 },

    #[error("maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("maximum evaluation depth of {limit} exceeded")]
    NestingTooDeep { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MountError {
    #[error("component rendered nothing")]
    EmptyTree,

    #[error("no chart element found in component output")]
    NoChart,

    #[error("`{element}` must be placed inside a chart")]
    Misplaced { element: String },

    #[error("chart `{chart}` has no usable data")]
    NoData { chart: String },

    #[error("invalid frame: {0}")]
    Frame(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("chart not found for export")]
    ChartNotFound,

    #[error("failed to rasterize chart: {0}")]
    Raster(String),

    #[error("download sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

impl ExportError {
    /// User-facing text shown in a blocking alert.
    #[must_use]
    pub fn alert_message(&self) -> String {
        match self {
            Self::ChartNotFound => "Gráfico não encontrado para exportação".to_owned(),
            Self::Raster(detail) => format!("Erro ao exportar gráfico: {detail}"),
            Self::Sink(err) => format!("Erro ao exportar gráfico: {err}"),
        }
    }
}

impl From<ChartError> for MountError {
    fn from(err: ChartError) -> Self {
        Self::Frame(err.to_string())
    }
}
