//! 面板应用模块 - 日程、行情与画面渲染

/// 日程数据
pub mod calendar;

/// 行情数据
pub mod market;

/// 外部数据源
pub mod source;

/// 点阵字体
pub mod font;

/// 渲染器
pub mod render;

/// 周期任务与显示模式
pub mod display;

// 重新导出公共类型
pub use calendar::{CalendarData, CalendarEvent};
pub use display::{CalendarJob, DisplayJob, MarketJob, PanelJobs, PanelState, Shared, View, install};
pub use market::{MarketData, MarketSummary};
pub use render::{BasicRenderer, Renderer, Scene};
pub use source::{CalendarSource, JsonFileCalendar, JsonFileMarket, MarketSource, ProviderError, Unconfigured};
