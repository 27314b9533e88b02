//! 驱动循环 - 按固定周期服务调度器
//!
//! 用 `mio::Poll` 的超时作为节拍器，`Waker` 用于从其他线程（信号处理）打断等待。

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mio::{Events, Poll, Token, Waker};
use tracing::{debug, info, warn};

use crate::cron::Scheduler;

const WAKE_TOKEN: Token = Token(0);

/// 停止驱动循环的句柄，可跨线程克隆
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    stopped: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// 请求停止；正在执行的任务会先执行完
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.waker.wake() {
                warn!("唤醒驱动循环失败: {}", e);
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// 驱动循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// 触发的节拍数
    pub ticks: u64,
    /// 实际执行了任务的节拍数
    pub serviced: u64,
    /// 因任务耗时过长而跳过的节拍数
    pub skipped: u64,
}

/// 固定周期节拍器
///
/// 每个节拍调用一次 `service_next_job`。落后时跳过错过的节拍，不会补发。
pub struct TickLoop {
    poll: Poll,
    events: Events,
    period: Duration,
    shutdown: ShutdownHandle,
    stats: LoopStats,
}

impl TickLoop {
    /// 创建节拍器
    ///
    /// # 参数
    /// - `period`: 节拍周期，必须大于0
    pub fn new(period: Duration) -> io::Result<Self> {
        if period.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "节拍周期不能为0",
            ));
        }

        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(8),
            period,
            shutdown: ShutdownHandle {
                waker: Arc::new(waker),
                stopped: Arc::new(AtomicBool::new(false)),
            },
            stats: LoopStats::default(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// 运行直到收到停止请求
    ///
    /// # 返回
    /// 停止时的统计信息
    pub fn run(&mut self, scheduler: &Scheduler) -> io::Result<LoopStats> {
        info!("调度循环启动, 周期 {:?}, 任务数 {}", self.period, scheduler.len());
        let mut next_tick = Instant::now() + self.period;

        while !self.shutdown.is_shutdown() {
            let now = Instant::now();
            if now < next_tick {
                match self.poll.poll(&mut self.events, Some(next_tick - now)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
                // 唤醒事件只用于打断等待，停止标志在循环条件里检查
                continue;
            }

            self.stats.ticks += 1;
            if scheduler.service_next_job().is_some() {
                self.stats.serviced += 1;
            }

            next_tick += self.period;
            let after = Instant::now();
            if next_tick <= after {
                let behind = (after - next_tick).as_nanos() / self.period.as_nanos() + 1;
                let missed = u32::try_from(behind).unwrap_or(u32::MAX);
                debug!("任务执行过久, 跳过 {} 个节拍", missed);
                self.stats.skipped += u64::from(missed);
                next_tick += self.period.saturating_mul(missed);
            }
        }

        info!(
            "调度循环停止: 节拍 {}, 执行 {}, 跳过 {}",
            self.stats.ticks, self.stats.serviced, self.stats.skipped
        );
        Ok(self.stats)
    }
}
