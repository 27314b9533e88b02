use serde::Deserialize;

use crate::panel::source::ProviderError;

/// 显示的指数代码（纳斯达克综合指数）
pub const NASDAQ_SYMBOL: &str = "^IXIC";

/// 行情摘要响应
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSummary {
    #[serde(rename = "marketSummaryResponse")]
    pub response: SummaryResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub result: Vec<Quote>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub regular_market_price: Formatted,
    #[serde(default)]
    pub regular_market_change_percent: Formatted,
}

/// 原始值 + 已格式化的字符串
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Formatted {
    #[serde(default)]
    pub raw: f64,
    #[serde(default)]
    pub fmt: String,
}

/// 行情显示内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketData {
    pub lines: [String; 2],
}

impl MarketData {
    /// 用最新摘要更新显示内容
    ///
    /// 响应带错误或没有目标指数时保留原内容并返回错误。
    pub fn update_from(&mut self, summary: &MarketSummary) -> Result<(), ProviderError> {
        if let Some(error) = &summary.response.error {
            return Err(ProviderError::Remote(error.to_string()));
        }

        let quote = summary
            .response
            .result
            .iter()
            .find(|q| q.symbol == NASDAQ_SYMBOL)
            .ok_or_else(|| ProviderError::MissingSymbol(NASDAQ_SYMBOL.to_string()))?;

        self.lines = [
            "NASDAQ".to_string(),
            format!(
                "{} {}",
                quote.regular_market_price.fmt, quote.regular_market_change_percent.fmt
            ),
        ];
        Ok(())
    }
}
