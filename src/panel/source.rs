//! 数据源 - 日程与行情
//!
//! 远程API客户端不在本库内；这里的实现读取外部抓取程序落盘的JSON。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::panel::calendar::CalendarEvent;
use crate::panel::market::MarketSummary;

/// 数据源错误类型
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("数据源未配置: 缺少 {0}")]
    NotConfigured(&'static str),

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("远端返回错误: {0}")]
    Remote(String),

    #[error("响应中没有 {0}")]
    MissingSymbol(String),
}

/// 日程数据源
pub trait CalendarSource: Send {
    /// 返回与 [from, to) 有交集的事件
    fn events(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError>;
}

/// 行情数据源
pub trait MarketSource: Send {
    fn summary(&mut self) -> Result<MarketSummary, ProviderError>;
}

impl<S: CalendarSource + ?Sized> CalendarSource for Box<S> {
    fn events(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        (**self).events(from, to)
    }
}

impl<S: MarketSource + ?Sized> MarketSource for Box<S> {
    fn summary(&mut self) -> Result<MarketSummary, ProviderError> {
        (**self).summary()
    }
}

/// 从JSON文件读取事件数组
pub struct JsonFileCalendar {
    path: PathBuf,
}

impl JsonFileCalendar {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CalendarSource for JsonFileCalendar {
    fn events(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        let raw = fs::read_to_string(&self.path)?;
        let events: Vec<CalendarEvent> = serde_json::from_str(&raw)?;
        let events: Vec<_> = events
            .into_iter()
            .filter(|e| e.start < to && e.end > from)
            .collect();
        debug!("从 {} 读取到 {} 个事件", self.path.display(), events.len());
        Ok(events)
    }
}

/// 从JSON文件读取行情摘要
pub struct JsonFileMarket {
    path: PathBuf,
}

impl JsonFileMarket {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MarketSource for JsonFileMarket {
    fn summary(&mut self) -> Result<MarketSummary, ProviderError> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// 未配置的数据源：每次都报告缺少的配置项
pub struct Unconfigured(pub &'static str);

impl CalendarSource for Unconfigured {
    fn events(
        &mut self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }
}

impl MarketSource for Unconfigured {
    fn summary(&mut self) -> Result<MarketSummary, ProviderError> {
        Err(ProviderError::NotConfigured(self.0))
    }
}
