use serde::{Deserialize, Serialize};

/// Chart primitives exposed under the charting namespace binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartKind {
    ResponsiveContainer,
    LineChart,
    BarChart,
    AreaChart,
    ComposedChart,
    PieChart,
    Line,
    Bar,
    Area,
    Pie,
    Cell,
    XAxis,
    YAxis,
    CartesianGrid,
    Tooltip,
    Legend,
}

impl ChartKind {
    pub const ALL: [Self; 16] = [
        Self::ResponsiveContainer,
        Self::LineChart,
        Self::BarChart,
        Self::AreaChart,
        Self::ComposedChart,
        Self::PieChart,
        Self::Line,
        Self::Bar,
        Self::Area,
        Self::Pie,
        Self::Cell,
        Self::XAxis,
        Self::YAxis,
        Self::CartesianGrid,
        Self::Tooltip,
        Self::Legend,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ResponsiveContainer => "ResponsiveContainer",
            Self::LineChart => "LineChart",
            Self::BarChart => "BarChart",
            Self::AreaChart => "AreaChart",
            Self::ComposedChart => "ComposedChart",
            Self::PieChart => "PieChart",
            Self::Line => "Line",
            Self::Bar => "Bar",
            Self::Area => "Area",
            Self::Pie => "Pie",
            Self::Cell => "Cell",
            Self::XAxis => "XAxis",
            Self::YAxis => "YAxis",
            Self::CartesianGrid => "CartesianGrid",
            Self::Tooltip => "Tooltip",
            Self::Legend => "Legend",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Chart roots own a data set and a plot area.
    #[must_use]
    pub const fn is_chart_root(self) -> bool {
        matches!(
            self,
            Self::LineChart | Self::BarChart | Self::AreaChart | Self::ComposedChart | Self::PieChart
        )
    }

    #[must_use]
    pub const fn is_cartesian_series(self) -> bool {
        matches!(self, Self::Line | Self::Bar | Self::Area)
    }
}
