use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, trace};

use crate::cron::clock::{Clock, SystemClock};

/// 调度错误类型
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("任务间隔必须大于0")]
    ZeroInterval,

    #[error("任务间隔 {0:?} 超出上限")]
    IntervalTooLong(Duration),
}

/// 任务间隔上限（100年），保证运行时刻总能用 `Instant` 表示
pub const MAX_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// 任务句柄：单调递增，删除后也不会复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 任务动作：注册时捕获它需要的全部状态
pub type Action = Box<dyn FnMut() + Send + 'static>;

struct Job {
    handle: Handle,
    interval: Duration,
    next_run: Instant,
    /// 每个任务独立加锁，调度锁释放后执行
    action: Option<Arc<Mutex<Action>>>,
}

impl Job {
    fn last_run(&self) -> Option<Instant> {
        self.next_run.checked_sub(self.interval)
    }
}

/// 任务快照（只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub handle: Handle,
    pub interval: Duration,
    pub next_run: Instant,
    pub last_run: Option<Instant>,
}

struct ScheduleInner {
    /// 共同原点，只前进不后退
    basetime: Instant,

    /// 按 (next_run, handle) 升序
    jobs: Vec<Job>,

    next_handle: u64,

    serviced: u64,
}

impl ScheduleInner {
    fn sort_jobs(&mut self) {
        self.jobs
            .sort_by(|a, b| a.next_run.cmp(&b.next_run).then(a.handle.cmp(&b.handle)));
    }
}

/// 周期任务调度器
///
/// 所有任务的运行时刻都对齐到 `basetime + k·interval` 网格上；每次
/// [`service_next_job`](Scheduler::service_next_job) 最多执行一个到期任务。
/// 克隆得到的是同一个调度器的句柄，动作内部也可以持有它来增删任务。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<ScheduleInner>>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// 以当前时刻为原点创建空调度器
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let basetime = clock.now();
        Self {
            inner: Arc::new(Mutex::new(ScheduleInner {
                basetime,
                jobs: Vec::new(),
                next_handle: 0,
                serviced: 0,
            })),
            clock: Arc::new(clock),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 注册周期任务
    ///
    /// 首次运行时刻是网格上严格晚于当前时刻的最早点。`run_immediately`
    /// 为真时整体前移一个间隔，下一次服务即会执行，网格相位不变。
    pub fn add_job<F>(
        &self,
        interval: Duration,
        run_immediately: bool,
        action: F,
    ) -> Result<Handle, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        self.insert(interval, run_immediately, Some(Box::new(action)))
    }

    /// 注册没有动作的任务：照常推进时间戳，但不做任何工作
    pub fn add_idle_job(
        &self,
        interval: Duration,
        run_immediately: bool,
    ) -> Result<Handle, ScheduleError> {
        self.insert(interval, run_immediately, None)
    }

    fn insert(
        &self,
        interval: Duration,
        run_immediately: bool,
        action: Option<Action>,
    ) -> Result<Handle, ScheduleError> {
        if interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }
        if interval > MAX_INTERVAL {
            return Err(ScheduleError::IntervalTooLong(interval));
        }

        let mut inner = self.lock();
        let now = self.clock.now();

        let mut next_run = next_on_grid(inner.basetime, interval, now)
            .ok_or(ScheduleError::IntervalTooLong(interval))?;
        if run_immediately {
            next_run = next_run
                .checked_sub(interval)
                .ok_or(ScheduleError::IntervalTooLong(interval))?;
        }

        inner.next_handle += 1;
        let handle = Handle(inner.next_handle);
        inner.jobs.push(Job {
            handle,
            interval,
            next_run,
            action: action.map(|a| Arc::new(Mutex::new(a))),
        });
        inner.sort_jobs();

        debug!(
            "已注册任务 {}: 间隔 {:?}, 立即执行 {}, 当前任务数 {}",
            handle,
            interval,
            run_immediately,
            inner.jobs.len()
        );
        Ok(handle)
    }

    /// 删除任务；句柄不存在时什么也不做
    pub fn remove_job(&self, handle: Handle) -> bool {
        let mut inner = self.lock();
        match inner.jobs.iter().position(|j| j.handle == handle) {
            Some(index) => {
                inner.jobs.remove(index);
                debug!("已删除任务 {}", handle);
                true
            }
            None => false,
        }
    }

    /// 服务最早的一个到期任务
    ///
    /// 只检查排序后的第一个任务。到期则把 `basetime` 与该任务的上次运行
    /// 时间设为当前时刻、重新排序，然后在调用方线程上执行其动作一次。
    /// 时间戳和顺序在调度锁内提交，动作在锁外执行，因此动作运行期间
    /// 其他线程（以及动作本身）仍可增删任务。返回被服务任务的句柄。
    pub fn service_next_job(&self) -> Option<Handle> {
        let (handle, action) = {
            let mut inner = self.lock();
            let now = self.clock.now();

            let (handle, interval, action) = match inner.jobs.first() {
                Some(job) if job.next_run <= now => (job.handle, job.interval, job.action.clone()),
                _ => return None,
            };
            let Some(next_run) = now.checked_add(interval) else {
                inner.jobs.remove(0);
                error!("任务 {} 的下次运行时刻超出可表示范围, 已删除", handle);
                return None;
            };
            inner.jobs[0].next_run = next_run;

            inner.basetime = inner.basetime.max(now);
            inner.serviced += 1;
            inner.sort_jobs();
            (handle, action)
        };

        trace!("服务任务 {}", handle);
        if let Some(action) = action {
            let mut run = action.lock().unwrap_or_else(|e| e.into_inner());
            (*run)();
        }
        Some(handle)
    }

    pub fn basetime(&self) -> Instant {
        self.lock().basetime
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// 按执行顺序返回任务快照
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.lock()
            .jobs
            .iter()
            .map(|j| JobInfo {
                handle: j.handle,
                interval: j.interval,
                next_run: j.next_run,
                last_run: j.last_run(),
            })
            .collect()
    }

    /// 获取调度器统计信息
    pub fn stats(&self) -> SchedulerStats {
        let inner = self.lock();
        let now = self.clock.now();
        SchedulerStats {
            jobs: inner.jobs.len(),
            serviced: inner.serviced,
            due: inner.jobs.iter().filter(|j| j.next_run <= now).count(),
            basetime: inner.basetime,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// 调度器统计信息
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub jobs: usize,
    pub serviced: u64,
    pub due: usize,
    pub basetime: Instant,
}

/// 网格 `basetime + k·interval` 上严格晚于 `now` 的最小点（k ≥ 1）
///
/// 结果无法用 `Instant` 表示时返回 `None`。
fn next_on_grid(basetime: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    let step = interval.as_nanos();
    let elapsed = now.saturating_duration_since(basetime).as_nanos();
    let offset = step.checked_mul(elapsed / step + 1)?;
    let secs = u64::try_from(offset / 1_000_000_000).ok()?;
    // 余数小于 10^9，转换不会截断
    basetime.checked_add(Duration::new(secs, (offset % 1_000_000_000) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cron::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MINUTE: Duration = Duration::from_secs(60);
    const FIVE_SECS: Duration = Duration::from_secs(5);

    fn handles(sched: &Scheduler) -> Vec<u64> {
        sched.jobs().iter().map(|j| j.handle.get()).collect()
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_sort_order_with_ties() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());

        sched.add_idle_job(MINUTE, false).unwrap();
        sched.add_idle_job(FIVE_SECS, false).unwrap();
        sched.add_idle_job(MINUTE, false).unwrap();
        sched.add_idle_job(MINUTE, true).unwrap();
        sched.add_idle_job(FIVE_SECS, false).unwrap();

        assert_eq!(handles(&sched), vec![4, 2, 5, 1, 3]);

        // 立即任务执行后排到同相位的1分钟任务之后
        assert_eq!(sched.service_next_job().map(Handle::get), Some(4));
        assert_eq!(handles(&sched), vec![2, 5, 1, 3, 4]);
    }

    #[test]
    fn test_single_service_per_call() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        let a = sched.add_job(FIVE_SECS, false, first).unwrap();
        let b = sched.add_job(FIVE_SECS, false, second).unwrap();

        // 尚未到期
        assert_eq!(sched.service_next_job(), None);

        clock.advance(FIVE_SECS);
        assert_eq!(sched.service_next_job(), Some(a));
        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);

        assert_eq!(sched.service_next_job(), Some(b));
        assert_eq!(second_count.load(Ordering::SeqCst), 1);

        assert_eq!(sched.service_next_job(), None);
        assert_eq!(sched.stats().serviced, 2);
    }

    #[test]
    fn test_phase_alignment_for_late_registration() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        let origin = sched.basetime();

        clock.advance(Duration::from_secs(7));
        sched.add_idle_job(FIVE_SECS, false).unwrap();
        sched.add_idle_job(FIVE_SECS, true).unwrap();

        let jobs = sched.jobs();
        assert_eq!(jobs[0].next_run, origin + FIVE_SECS);
        assert_eq!(jobs[1].next_run, origin + Duration::from_secs(10));

        // 恰好落在网格点上时取下一个点
        clock.advance(Duration::from_secs(3));
        let h = sched.add_idle_job(FIVE_SECS, false).unwrap();
        let job = sched.jobs().into_iter().find(|j| j.handle == h).unwrap();
        assert_eq!(job.next_run, origin + Duration::from_secs(15));
    }

    #[test]
    fn test_run_immediately_keeps_interval_invariant() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        clock.advance(MINUTE);

        sched.add_idle_job(FIVE_SECS, true).unwrap();
        let job = &sched.jobs()[0];
        assert!(job.next_run <= clock.now());
        assert_eq!(job.last_run.map(|l| l + job.interval), Some(job.next_run));
    }

    #[test]
    fn test_service_moves_basetime_and_reschedules() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        let origin = sched.basetime();
        let h = sched.add_idle_job(FIVE_SECS, false).unwrap();

        // 抖动：晚了1.5秒才服务
        clock.advance(Duration::from_millis(6500));
        assert_eq!(sched.service_next_job(), Some(h));

        let now = clock.now();
        assert_eq!(sched.basetime(), now);
        assert!(sched.basetime() > origin);
        let job = &sched.jobs()[0];
        assert_eq!(job.last_run, Some(now));
        assert_eq!(job.next_run, now + FIVE_SECS);
    }

    #[test]
    fn test_basetime_never_decreases() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        sched.add_idle_job(Duration::from_secs(2), true).unwrap();
        sched.add_idle_job(Duration::from_secs(3), false).unwrap();

        let mut last = sched.basetime();
        for step in 0..50u64 {
            clock.advance(Duration::from_millis(700 + step % 3 * 150));
            if step % 7 == 0 {
                sched.add_idle_job(Duration::from_secs(1 + step % 4), step % 2 == 0).unwrap();
            }
            sched.service_next_job();
            let base = sched.basetime();
            assert!(base >= last);
            last = base;
        }
    }

    #[test]
    fn test_remove_and_handles_not_reused() {
        let sched = Scheduler::with_clock(ManualClock::new());
        let a = sched.add_idle_job(MINUTE, false).unwrap();
        let b = sched.add_idle_job(MINUTE, false).unwrap();

        assert!(sched.remove_job(b));
        assert!(!sched.remove_job(b));
        assert!(!sched.remove_job(Handle(99)));

        let c = sched.add_idle_job(MINUTE, false).unwrap();
        assert!(c > b);
        assert_eq!(handles(&sched), vec![a.get(), c.get()]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let sched = Scheduler::with_clock(ManualClock::new());
        assert_eq!(
            sched.add_idle_job(Duration::ZERO, true),
            Err(ScheduleError::ZeroInterval)
        );
        assert!(sched.is_empty());
        assert_eq!(sched.service_next_job(), None);
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());

        assert_eq!(
            sched.add_idle_job(Duration::MAX, false),
            Err(ScheduleError::IntervalTooLong(Duration::MAX))
        );
        let huge = Duration::from_secs(u64::MAX / 2);
        assert_eq!(
            sched.add_idle_job(huge, true),
            Err(ScheduleError::IntervalTooLong(huge))
        );
        assert!(sched.is_empty());

        // 上限本身可用，服务后照常重排
        let h = sched.add_idle_job(MAX_INTERVAL, true).unwrap();
        assert_eq!(sched.service_next_job(), Some(h));
        let job = &sched.jobs()[0];
        assert_eq!(job.next_run, clock.now() + MAX_INTERVAL);
        assert_eq!(job.last_run, Some(clock.now()));
    }

    #[test]
    fn test_action_can_mutate_schedule() {
        let clock = ManualClock::new();
        let sched = Scheduler::with_clock(clock.clone());
        let (spawned_count, spawned) = counter();
        let mut spawned = Some(spawned);

        let admin = sched.clone();
        sched
            .add_job(FIVE_SECS, true, move || {
                // 在动作内部注册新任务不会死锁
                if let Some(action) = spawned.take() {
                    admin.add_job(FIVE_SECS, true, action).unwrap();
                }
            })
            .unwrap();

        assert!(sched.service_next_job().is_some());
        assert_eq!(sched.len(), 2);
        assert!(sched.service_next_job().is_some());
        assert_eq!(spawned_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_add_yields_unique_handles() {
        let sched = Scheduler::with_clock(ManualClock::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let sched = sched.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| sched.add_idle_job(MINUTE, false).unwrap().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (1..=200).collect::<Vec<_>>());
        assert_eq!(handles(&sched), all);
    }
}
