//! 面板显示任务
//!
//! 三个周期任务共享日程和行情两块数据：刷新任务写入，显示任务读取。
//! 显示模式只属于显示任务本身。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use tracing::{debug, error, info};

use crate::config::PanelConfig;
use crate::cron::{Handle, ScheduleError, Scheduler};
use crate::panel::calendar::{CalendarData, day_bounds};
use crate::panel::market::MarketData;
use crate::panel::render::{Renderer, Scene};
use crate::panel::source::{CalendarSource, MarketSource};
use crate::pusher::{ClientError, Network, PanelClient};

/// 任务之间共享的数据
pub type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// 行情画面对应的模式
const MARKET_MODE: u8 = 4;

/// 当前要渲染的画面
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Clock,
    Market,
}

/// 显示模式状态机
///
/// 模式 0-3 显示时钟；有待办事件时逐个递增，否则直接跳到行情。
/// 模式 4 显示行情；有待办事件时回到 0，否则一直停在行情。
#[derive(Debug, Default, Clone)]
pub struct PanelState {
    mode: u8,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// 返回本次要显示的画面，并推进到下一个模式
    pub fn advance(&mut self, upcoming_event: bool) -> View {
        if self.mode < MARKET_MODE {
            self.mode = if upcoming_event { self.mode + 1 } else { MARKET_MODE };
            View::Clock
        } else {
            if upcoming_event {
                self.mode = 0;
            }
            View::Market
        }
    }
}

/// 日程刷新任务
pub struct CalendarJob<S> {
    source: S,
    data: Shared<CalendarData>,
}

impl<S: CalendarSource> CalendarJob<S> {
    pub fn new(source: S, data: Shared<CalendarData>) -> Self {
        Self { source, data }
    }

    pub fn run(&mut self) {
        self.run_at(&Local::now());
    }

    /// 拉取 `now` 所在当天的事件并更新显示内容
    ///
    /// 数据源失败时显示兜底内容，不会传播错误。
    pub fn run_at<Tz: TimeZone>(&mut self, now: &DateTime<Tz>)
    where
        Tz::Offset: fmt::Display,
    {
        let (from, to) = day_bounds(now);
        let summary = match self.source.events(from, to) {
            Ok(events) => CalendarData::summarize(&events, now),
            Err(e) => {
                error!("获取日程失败: {}", e);
                CalendarData::unavailable()
            }
        };
        debug!("日程更新: {:?}", summary.lines);
        *lock(&self.data) = summary;
    }
}

/// 行情刷新任务
pub struct MarketJob<S> {
    source: S,
    data: Shared<MarketData>,
}

impl<S: MarketSource> MarketJob<S> {
    pub fn new(source: S, data: Shared<MarketData>) -> Self {
        Self { source, data }
    }

    /// 失败时保留上一次的行情
    pub fn run(&mut self) {
        let result = self
            .source
            .summary()
            .and_then(|summary| lock(&self.data).update_from(&summary));
        match result {
            Ok(()) => debug!("行情更新: {:?}", lock(&self.data).lines),
            Err(e) => error!("获取行情失败: {}", e),
        }
    }
}

/// 面板显示任务：渲染当前画面并推送到面板
pub struct DisplayJob {
    network: Network,
    address: String,
    rows: usize,
    cols: usize,
    renderer: Box<dyn Renderer>,
    state: PanelState,
    calendar: Shared<CalendarData>,
    market: Shared<MarketData>,
}

impl DisplayJob {
    pub fn new(
        config: &PanelConfig,
        renderer: Box<dyn Renderer>,
        calendar: Shared<CalendarData>,
        market: Shared<MarketData>,
    ) -> Self {
        Self {
            network: config.network,
            address: config.address.clone(),
            rows: config.rows,
            cols: config.cols,
            renderer,
            state: PanelState::new(),
            calendar,
            market,
        }
    }

    pub fn mode(&self) -> u8 {
        self.state.mode()
    }

    pub fn run(&mut self) {
        debug!("更新面板, 模式 {}", self.state.mode());
        let scene = self.next_scene(Local::now().time());
        if let Err(e) = self.push(&scene) {
            error!("更新面板失败: {}", e);
        }
    }

    /// 按当前模式取画面内容并推进模式
    pub fn next_scene(&mut self, time: NaiveTime) -> Scene {
        let calendar = lock(&self.calendar).clone();
        match self.state.advance(calendar.upcoming_event) {
            View::Clock => Scene::Clock {
                lines: calendar.lines,
                time,
            },
            View::Market => Scene::Market {
                lines: lock(&self.market).lines.clone(),
            },
        }
    }

    // 每次推送使用新的客户端，发送后关闭
    fn push(&self, scene: &Scene) -> Result<usize, ClientError> {
        let mut client = PanelClient::new(self.network, self.address.as_str(), self.rows, self.cols)?;
        let image = self.renderer.render(scene);
        let result = client.send_image(&image);
        client.close();
        result
    }
}

/// 已注册的面板任务
#[derive(Debug, Clone)]
pub struct PanelJobs {
    pub calendar: Handle,
    pub market: Handle,
    pub display: Handle,
    pub calendar_data: Shared<CalendarData>,
    pub market_data: Shared<MarketData>,
}

/// 向调度器注册日程刷新、行情刷新和面板显示三个任务
///
/// 三个任务都在第一次服务时立即执行，注册顺序即同一时刻的执行顺序。
pub fn install<C, M>(
    scheduler: &Scheduler,
    config: &PanelConfig,
    calendar_source: C,
    market_source: M,
    renderer: Box<dyn Renderer>,
) -> Result<PanelJobs, ScheduleError>
where
    C: CalendarSource + 'static,
    M: MarketSource + 'static,
{
    let calendar_data: Shared<CalendarData> = Arc::default();
    let market_data: Shared<MarketData> = Arc::default();

    let mut calendar_job = CalendarJob::new(calendar_source, calendar_data.clone());
    let mut market_job = MarketJob::new(market_source, market_data.clone());
    let mut display_job = DisplayJob::new(
        config,
        renderer,
        calendar_data.clone(),
        market_data.clone(),
    );

    let refresh = config.refresh_interval();
    let calendar = scheduler.add_job(refresh, true, move || calendar_job.run())?;
    let market = scheduler.add_job(refresh, true, move || market_job.run())?;
    let display_handle =
        scheduler.add_job(config.display_interval(), true, move || display_job.run())?;

    info!(
        "面板任务已注册: 日程 {}, 行情 {}, 显示 {}",
        calendar, market, display_handle
    );

    Ok(PanelJobs {
        calendar,
        market,
        display: display_handle,
        calendar_data,
        market_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::ManualClock;
    use crate::panel::calendar::CalendarEvent;
    use crate::panel::market::MarketSummary;
    use crate::panel::render::BasicRenderer;
    use crate::panel::source::{ProviderError, Unconfigured};
    use crate::pusher::frame_len;
    use chrono::{FixedOffset, TimeDelta, Utc};
    use std::net::UdpSocket;
    use std::time::Duration;

    struct FixedEvents(Vec<CalendarEvent>);

    impl CalendarSource for FixedEvents {
        fn events(
            &mut self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<CalendarEvent>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct FixedSummary(&'static str);

    impl MarketSource for FixedSummary {
        fn summary(&mut self) -> Result<MarketSummary, ProviderError> {
            Ok(serde_json::from_str(self.0)?)
        }
    }

    fn test_config(address: String) -> PanelConfig {
        PanelConfig {
            debug: false,
            rows: 32,
            cols: 64,
            address,
            network: Network::Udp4,
            tick_ms: 1000,
            display_secs: 5,
            refresh_secs: 300,
            calendar_file: None,
            market_file: None,
        }
    }

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    fn upcoming(flag: bool) -> Shared<CalendarData> {
        Arc::new(Mutex::new(CalendarData {
            upcoming_event: flag,
            lines: ["Standup".to_string(), "until 9:30".to_string()],
        }))
    }

    #[test]
    fn test_mode_cycle_with_upcoming_event() {
        let mut state = PanelState::new();
        let views: Vec<View> = (0..6).map(|_| state.advance(true)).collect();
        assert_eq!(
            views,
            [
                View::Clock,
                View::Clock,
                View::Clock,
                View::Clock,
                View::Market,
                View::Clock
            ]
        );
        assert_eq!(state.mode(), 1);
    }

    #[test]
    fn test_mode_sticks_to_market_without_event() {
        let mut state = PanelState::new();
        assert_eq!(state.advance(false), View::Clock);
        assert_eq!(state.mode(), MARKET_MODE);
        for _ in 0..3 {
            assert_eq!(state.advance(false), View::Market);
        }
        // 出现新事件后回到时钟
        assert_eq!(state.advance(true), View::Market);
        assert_eq!(state.advance(true), View::Clock);
    }

    #[test]
    fn test_calendar_job_failure_shows_fallback() {
        let data: Shared<CalendarData> = Arc::new(Mutex::new(CalendarData {
            upcoming_event: true,
            lines: ["Old".to_string(), "data".to_string()],
        }));
        let mut job = CalendarJob::new(Unconfigured("PANEL_CALENDAR_FILE"), data.clone());
        job.run();
        assert_eq!(*data.lock().unwrap(), CalendarData::unavailable());
    }

    #[test]
    fn test_calendar_job_summarizes_today() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        let event = CalendarEvent {
            subject: "Planning".to_string(),
            start: (now + TimeDelta::hours(1)).with_timezone(&Utc),
            end: (now + TimeDelta::hours(2)).with_timezone(&Utc),
        };
        let data: Shared<CalendarData> = Arc::default();
        let mut job = CalendarJob::new(FixedEvents(vec![event]), data.clone());
        job.run_at(&now);

        let data = data.lock().unwrap();
        assert!(data.upcoming_event);
        assert_eq!(data.lines, ["Planning".to_string(), "10:00…11:00".to_string()]);
    }

    #[test]
    fn test_market_job_keeps_lines_on_error() {
        let data: Shared<MarketData> = Arc::default();
        let mut ok = MarketJob::new(
            FixedSummary(
                r#"{"marketSummaryResponse": {"result": [{"symbol": "^IXIC",
                    "regularMarketPrice": {"raw": 1.0, "fmt": "15,000.00"},
                    "regularMarketChangePercent": {"raw": -0.2, "fmt": "-0.20%"}}]}}"#,
            ),
            data.clone(),
        );
        ok.run();
        assert_eq!(data.lock().unwrap().lines[1], "15,000.00 -0.20%");

        let mut failing = MarketJob::new(Unconfigured("PANEL_MARKET_FILE"), data.clone());
        failing.run();
        assert_eq!(data.lock().unwrap().lines[1], "15,000.00 -0.20%");
    }

    #[test]
    fn test_display_scene_follows_mode() {
        let config = test_config("127.0.0.1:1".to_string());
        let market: Shared<MarketData> = Arc::new(Mutex::new(MarketData {
            lines: ["NASDAQ".to_string(), "1 2".to_string()],
        }));
        let mut job = DisplayJob::new(
            &config,
            Box::new(BasicRenderer::new(32, 64)),
            upcoming(false),
            market,
        );
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        assert!(matches!(job.next_scene(time), Scene::Clock { .. }));
        assert_eq!(
            job.next_scene(time),
            Scene::Market {
                lines: ["NASDAQ".to_string(), "1 2".to_string()]
            }
        );
    }

    #[test]
    fn test_display_job_pushes_frame() {
        let rx = receiver();
        let config = test_config(rx.local_addr().unwrap().to_string());
        let mut job = DisplayJob::new(
            &config,
            Box::new(BasicRenderer::new(32, 64)),
            upcoming(true),
            Arc::default(),
        );
        job.run();
        assert_eq!(job.mode(), 1);

        let mut buf = vec![0u8; 16384];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, frame_len(32, 64));
        // 每次都是新客户端，序号从1开始
        assert_eq!(&buf[..4], &1u32.to_le_bytes());
    }

    #[test]
    fn test_install_runs_all_jobs_immediately() {
        let rx = receiver();
        let config = test_config(rx.local_addr().unwrap().to_string());
        let scheduler = Scheduler::with_clock(ManualClock::new());

        let jobs = install(
            &scheduler,
            &config,
            Unconfigured("PANEL_CALENDAR_FILE"),
            Unconfigured("PANEL_MARKET_FILE"),
            Box::new(BasicRenderer::new(config.rows, config.cols)),
        )
        .unwrap();
        assert_eq!(scheduler.len(), 3);

        assert_eq!(scheduler.service_next_job(), Some(jobs.calendar));
        assert_eq!(scheduler.service_next_job(), Some(jobs.market));
        assert_eq!(scheduler.service_next_job(), Some(jobs.display));

        assert_eq!(*jobs.calendar_data.lock().unwrap(), CalendarData::unavailable());
        let mut buf = vec![0u8; 16384];
        assert_eq!(rx.recv(&mut buf).unwrap(), frame_len(32, 64));
    }
}
