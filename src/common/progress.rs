//! 传输进度
//!
//! 工作任务只对共享计数器做原子累加；上报任务按固定间隔采样并输出到 `ProgressSink`

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// 共享进度状态
///
/// 计数器只增不减，克隆后指向同一计数器
#[derive(Debug, Clone)]
pub struct ProgressState {
    transferred: Arc<AtomicU64>,
    started_at: Instant,
}

impl ProgressState {
    pub fn new() -> Self {
        Self {
            transferred: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// 累加已传输字节数
    pub fn add(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// 当前已传输字节数
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 采样当前进度
    pub fn snapshot(&self, total: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            transferred: self.transferred(),
            total,
            elapsed: self.elapsed(),
        }
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

/// 某一时刻的进度采样
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    pub total: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// 进度百分比（总大小为 0 时视为 100%）
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.transferred as f64 / self.total as f64 * 100.0
    }

    /// 平均速度（字节/秒）
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.transferred as f64 / secs
    }

    /// 预计剩余时间，速度为 0 时无法估算
    pub fn eta(&self) -> Option<Duration> {
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.transferred);
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    /// 按完成状态改写（已传输 = 总大小）
    fn completed(mut self) -> Self {
        self.transferred = self.total;
        self
    }
}

/// 进度输出目标
pub trait ProgressSink: Send + Sync + 'static {
    /// 周期性采样
    fn update(&self, snapshot: &ProgressSnapshot);

    /// 传输完成后的最后一次输出
    fn finish(&self, snapshot: &ProgressSnapshot);
}

/// 终端进度条，单行刷新输出到 stderr
#[derive(Debug, Default)]
pub struct TerminalSink;

impl TerminalSink {
    fn render(snapshot: &ProgressSnapshot) -> String {
        let eta = snapshot
            .eta()
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "--".to_string());
        format!(
            "{:.2}% | {} / {} | {}/s | 已用时 {}s | 剩余 {}",
            snapshot.percent(),
            format_bytes(snapshot.transferred),
            format_bytes(snapshot.total),
            format_bytes(snapshot.speed() as u64),
            snapshot.elapsed.as_secs(),
            eta
        )
    }
}

impl ProgressSink for TerminalSink {
    fn update(&self, snapshot: &ProgressSnapshot) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}\x1b[K", Self::render(snapshot));
        let _ = stderr.flush();
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "\r{}\x1b[K", Self::render(snapshot));
    }
}

/// 丢弃所有输出
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct NullSink;

#[cfg(test)]
impl ProgressSink for NullSink {
    fn update(&self, _snapshot: &ProgressSnapshot) {}

    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// 进度上报任务
///
/// 从得知总大小起运行，直到 `finish` / `stop` 发出停止信号
pub struct ProgressReporter {
    stop_tx: Option<oneshot::Sender<bool>>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(
        state: ProgressState,
        total: u64,
        interval: Duration,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<bool>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    completed = &mut stop_rx => {
                        // 发送端被丢弃视为未完成
                        if completed.unwrap_or(false) {
                            sink.finish(&state.snapshot(total).completed());
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        sink.update(&state.snapshot(total));
                    }
                }
            }
            debug!("进度上报任务退出");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// 传输成功：输出最终 100% 并等待上报任务退出
    pub async fn finish(mut self) {
        self.shutdown(true).await;
    }

    /// 传输失败：不输出完成行，直接停止
    pub async fn stop(mut self) {
        self.shutdown(false).await;
    }

    async fn shutdown(&mut self, completed: bool) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(completed);
        }
        let _ = (&mut self.handle).await;
    }
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
