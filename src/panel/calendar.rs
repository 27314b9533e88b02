use std::fmt;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;

/// 日程事件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarEvent {
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 日程显示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarData {
    /// 今天还有未结束的事件
    pub upcoming_event: bool,
    pub lines: [String; 2],
}

impl Default for CalendarData {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl CalendarData {
    /// 数据源不可用时的兜底内容
    pub fn unavailable() -> Self {
        Self {
            upcoming_event: false,
            lines: ["See".to_string(), "receptionist".to_string()],
        }
    }

    /// 根据今天的事件生成两行显示内容
    ///
    /// 取最早开始的未结束事件：
    /// - 距开始超过5分钟: 主题 + 起止时间
    /// - 5分钟内开始: "Available" + 开始时间
    /// - 已经开始: 主题 + 结束时间
    pub fn summarize<Tz: TimeZone>(events: &[CalendarEvent], now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        let Some(next) = events
            .iter()
            .filter(|e| e.end > *now)
            .min_by_key(|e| e.start)
        else {
            return Self {
                upcoming_event: false,
                lines: ["Available".to_string(), String::new()],
            };
        };

        let tz = now.timezone();
        let start = next.start.with_timezone(&tz);
        let end = next.end.with_timezone(&tz);
        let lines = if start.clone() - TimeDelta::minutes(5) > *now {
            [
                next.subject.clone(),
                format!("{}…{}", clock_time(&start), clock_time(&end)),
            ]
        } else if start > *now {
            ["Available".to_string(), format!("until {}", clock_time(&start))]
        } else {
            [next.subject.clone(), format!("until {}", clock_time(&end))]
        };

        Self {
            upcoming_event: true,
            lines,
        }
    }
}

/// 12小时制 "h:mm"
fn clock_time<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    t.format("%-I:%M").to_string()
}

/// 当天 [00:00, 次日00:00) 的UTC区间
pub fn day_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let start = now
        .timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc));
    (start, start + TimeDelta::days(1))
}
