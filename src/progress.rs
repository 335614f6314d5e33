//! 进度事件与节流
//!
//! 原始进度事件先经过 `ProgressThrottle`，按数量或时间间隔决定是否转发给 sink；
//! 阶段边界（开始、每个工作表结束、保存、完成）使用 `flush` 强制发送。

// 标准库导入
use std::time::{Duration, Instant};

// 第三方crate导入
use serde::Serialize;

/// 进度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Complete,
    Error,
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub status: ProgressStatus,
}

impl ProgressEvent {
    pub fn processing(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            status: ProgressStatus::Processing,
        }
    }

    pub fn complete(total: usize, message: impl Into<String>) -> Self {
        Self {
            current: total,
            total,
            message: message.into(),
            status: ProgressStatus::Complete,
        }
    }

    pub fn error(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            status: ProgressStatus::Error,
        }
    }

    /// 完成百分比（total 为 0 时记为 0）
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64 * 100.0
        }
    }
}

/// 进度接收方，同步调用
pub trait ProgressSink: Send {
    fn emit(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn emit(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&mut self, _event: &ProgressEvent) {}
}

/// 进度节流器
pub struct ProgressThrottle<S> {
    sink: S,
    batch_size: usize,
    time_threshold: Duration,
    last_emitted_count: usize,
    last_emit_time: Instant,
    emitted: usize,
}

impl<S: ProgressSink> ProgressThrottle<S> {
    pub fn new(sink: S, batch_size: usize, time_threshold: Duration) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            time_threshold,
            last_emitted_count: 0,
            last_emit_time: Instant::now(),
            emitted: 0,
        }
    }

    /// 上报一个处理中事件，返回是否实际发送
    pub fn report(&mut self, current: usize, total: usize, message: impl Into<String>) -> bool {
        self.report_at(ProgressEvent::processing(current, total, message), Instant::now())
    }

    /// 以给定时刻判断并上报事件
    pub fn report_at(&mut self, event: ProgressEvent, now: Instant) -> bool {
        let due = event.current == 0
            || event.current.saturating_sub(self.last_emitted_count) >= self.batch_size
            || now.saturating_duration_since(self.last_emit_time) > self.time_threshold;

        if due {
            self.emit_at(&event, now);
        }
        due
    }

    /// 强制发送处理中事件
    pub fn flush(&mut self, current: usize, total: usize, message: impl Into<String>) {
        self.flush_event(ProgressEvent::processing(current, total, message));
    }

    /// 强制发送任意状态的事件
    pub fn flush_event(&mut self, event: ProgressEvent) {
        self.emit_at(&event, Instant::now());
    }

    /// 已发送的事件数
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn emit_at(&mut self, event: &ProgressEvent, now: Instant) {
        self.sink.emit(event);
        self.last_emitted_count = event.current;
        self.last_emit_time = now;
        self.emitted += 1;
    }
}
