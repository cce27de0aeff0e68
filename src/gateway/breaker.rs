//! 每个上游一个熔断器，只用原子量，不加锁

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_OPEN_FOR: Duration = Duration::from_secs(30);

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 达到失败阈值后打开固定时长；没有半开状态，计时结束即恢复放行
#[derive(Debug)]
pub struct Breaker {
    failures: AtomicU32,
    opened_until_ms: AtomicI64,
    threshold: u32,
    open_for: Duration,
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_OPEN_FOR)
    }
}

impl Breaker {
    pub fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            opened_until_ms: AtomicI64::new(0),
            threshold: threshold.max(1),
            open_for,
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(now_millis())
    }

    pub fn allow_at(&self, now_ms: i64) -> bool {
        now_ms >= self.opened_until_ms.load(Ordering::Acquire)
    }

    /// 返回这次失败是否打开了熔断器
    pub fn record_failure(&self) -> bool {
        self.record_failure_at(now_millis())
    }

    pub fn record_failure_at(&self, now_ms: i64) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.threshold {
            return false;
        }

        self.failures.store(0, Ordering::Release);
        self.opened_until_ms
            .store(now_ms + self.open_for.as_millis() as i64, Ordering::Release);
        metrics::counter!("gateway_breaker_opens_total").increment(1);
        true
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}
