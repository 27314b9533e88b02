use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use matrix_panel::config::PanelConfig;
use matrix_panel::cron::{ManualClock, Scheduler};
use matrix_panel::panel::{self, BasicRenderer, JsonFileCalendar, JsonFileMarket};
use matrix_panel::pusher::{
    DecodedFrame, Network, PanelClient, PanelMonitor, PixelImage, Rgba, SequenceEvent,
};
use mio::{Events, Poll, Token};

const ROWS: usize = 16;
const COLS: usize = 32;

/// 带事件循环的接收端
struct Receiver {
    poll: Poll,
    events: Events,
    monitor: PanelMonitor,
}

impl Receiver {
    fn new() -> Self {
        let poll = Poll::new().unwrap();
        let mut monitor = PanelMonitor::bind("127.0.0.1:0".parse().unwrap(), ROWS, COLS).unwrap();
        monitor.register(poll.registry(), Token(0)).unwrap();
        Self {
            poll,
            events: Events::with_capacity(16),
            monitor,
        }
    }

    fn address(&self) -> String {
        self.monitor.local_addr().unwrap().to_string()
    }

    fn recv(&mut self) -> (DecodedFrame, SequenceEvent) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(received) = self.monitor.try_recv().unwrap() {
                return received;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            assert!(!left.is_zero(), "等待帧超时");
            self.poll.poll(&mut self.events, Some(left)).unwrap();
        }
    }
}

fn gradient(shift: u8) -> PixelImage {
    PixelImage::from_fn(ROWS, COLS, |x, y| {
        Rgba::rgb(x as u8 * 8, y as u8 * 16, shift)
    })
}

#[test]
fn test_scheduled_pushes_arrive_in_order() {
    let mut rx = Receiver::new();
    let clock = ManualClock::new();
    let scheduler = Scheduler::with_clock(clock.clone());

    let client = Arc::new(Mutex::new(
        PanelClient::new(Network::Udp4, rx.address(), ROWS, COLS).unwrap(),
    ));
    let sender = client.clone();
    let mut shift = 0u8;
    scheduler
        .add_job(Duration::from_secs(5), true, move || {
            shift += 1;
            sender.lock().unwrap().send_image(&gradient(shift)).unwrap();
        })
        .unwrap();

    for expected in 1..=3u32 {
        assert!(scheduler.service_next_job().is_some());
        // 同一时刻只服务一次
        assert!(scheduler.service_next_job().is_none());

        let (frame, event) = rx.recv();
        assert_eq!(frame.sequence, expected);
        assert_eq!(frame.image, gradient(expected as u8));
        let wanted = if expected == 1 {
            SequenceEvent::First
        } else {
            SequenceEvent::InOrder
        };
        assert_eq!(event, wanted);

        clock.advance(Duration::from_secs(5));
    }

    let stats = rx.monitor.stats();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.lost, 0);
    assert_eq!(client.lock().unwrap().sequence(), 4);
}

#[test]
fn test_panel_daemon_jobs_end_to_end() {
    let dir = std::env::temp_dir();
    let calendar = dir.join(format!("matrix-panel-it-{}-calendar.json", std::process::id()));
    let market = dir.join(format!("matrix-panel-it-{}-market.json", std::process::id()));
    fs::write(&calendar, "[]").unwrap();
    fs::write(
        &market,
        r#"{"marketSummaryResponse": {"result": [{"symbol": "^IXIC",
            "regularMarketPrice": {"raw": 14000.0, "fmt": "14,000.00"},
            "regularMarketChangePercent": {"raw": 1.25, "fmt": "1.25%"}}], "error": null}}"#,
    )
    .unwrap();

    let mut rx = Receiver::new();
    let config = PanelConfig {
        debug: false,
        rows: ROWS,
        cols: COLS,
        address: rx.address(),
        network: Network::Udp,
        tick_ms: 1000,
        display_secs: 5,
        refresh_secs: 300,
        calendar_file: Some(calendar.clone()),
        market_file: Some(market.clone()),
    };
    config.validate().unwrap();

    let clock = ManualClock::new();
    let scheduler = Scheduler::with_clock(clock.clone());
    let jobs = panel::install(
        &scheduler,
        &config,
        JsonFileCalendar::new(&calendar),
        JsonFileMarket::new(&market),
        Box::new(BasicRenderer::new(ROWS, COLS)),
    )
    .unwrap();

    // 日程、行情、显示依次立即执行
    assert_eq!(scheduler.service_next_job(), Some(jobs.calendar));
    assert_eq!(scheduler.service_next_job(), Some(jobs.market));
    assert_eq!(scheduler.service_next_job(), Some(jobs.display));
    assert_eq!(scheduler.service_next_job(), None);

    {
        let calendar = jobs.calendar_data.lock().unwrap();
        assert!(!calendar.upcoming_event);
        assert_eq!(calendar.lines[0], "Available");
    }
    assert_eq!(
        jobs.market_data.lock().unwrap().lines,
        ["NASDAQ".to_string(), "14,000.00 1.25%".to_string()]
    );

    let (first, event) = rx.recv();
    assert_eq!(event, SequenceEvent::First);
    assert_eq!(first.sequence, 1);

    // 没有待办事件: 下一次显示切换到行情画面
    clock.advance(Duration::from_secs(5));
    assert_eq!(scheduler.service_next_job(), Some(jobs.display));
    let (second, event) = rx.recv();
    assert_eq!(second.sequence, 1);
    assert_eq!(event, SequenceEvent::Restart);
    assert_ne!(first.image, second.image);

    fs::remove_file(calendar).unwrap();
    fs::remove_file(market).unwrap();
}

#[test]
fn test_mismatched_image_is_not_sent() {
    let rx = Receiver::new();
    let mut client = PanelClient::new(Network::Udp4, rx.address(), ROWS, COLS).unwrap();
    assert!(client.send_image(&PixelImage::new(ROWS + 1, COLS)).is_err());
    assert_eq!(client.sequence(), 1);
}
