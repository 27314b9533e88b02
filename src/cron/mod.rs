//! 周期任务调度模块 - 相位对齐的确定性调度器

/// 时间来源
pub mod clock;

/// 调度器实现
pub mod schedule;

// 重新导出公共类型
pub use clock::{Clock, ManualClock, SystemClock};
pub use schedule::{Action, Handle, JobInfo, MAX_INTERVAL, ScheduleError, Scheduler, SchedulerStats};
