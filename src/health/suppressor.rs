//! 告警抑制
//!
//! 同一站点同类告警在冷却时间内只发送一次。恢复类事件不经过该判断。

use crate::notification::event::EventKind;
use std::collections::HashMap;
use tracing::info;

/// 抑制日志的最短/最长节流间隔（秒）
const MIN_LOG_THROTTLE_SECONDS: i64 = 30;
const MAX_LOG_THROTTLE_SECONDS: i64 = 300;

/// 每个站点的发送记录（epoch 秒）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppressionLedger {
    last_sent: HashMap<EventKind, i64>,
    last_logged: HashMap<EventKind, i64>,
}

impl SuppressionLedger {
    /// 该类事件最近一次发送时间
    pub fn last_sent(&self, kind: EventKind) -> Option<i64> {
        self.last_sent.get(&kind).copied()
    }
}

/// 告警抑制器
#[derive(Debug, Clone, Copy)]
pub struct AlertSuppressor {
    cooldown_seconds: i64,
}

impl AlertSuppressor {
    pub fn new(cooldown_seconds: i64) -> Self {
        Self { cooldown_seconds }
    }

    /// 是否允许发送
    pub fn should_send(&self, ledger: &SuppressionLedger, kind: EventKind, now: i64) -> bool {
        if self.cooldown_seconds <= 0 {
            return true;
        }
        match ledger.last_sent.get(&kind) {
            None => true,
            Some(last) => now - last >= self.cooldown_seconds,
        }
    }

    /// 记录一次发送
    pub fn mark_sent(&self, ledger: &mut SuppressionLedger, kind: EventKind, now: i64) {
        ledger.last_sent.insert(kind, now);
        ledger.last_logged.remove(&kind);
    }

    /// 输出抑制日志，按节流间隔限频
    ///
    /// # 返回
    /// * `bool` - 本次是否输出了日志
    pub fn log_suppressed(
        &self,
        ledger: &mut SuppressionLedger,
        site_name: &str,
        kind: EventKind,
        now: i64,
    ) -> bool {
        if self.cooldown_seconds <= 0 {
            return false;
        }
        let Some(last_sent) = ledger.last_sent.get(&kind).copied() else {
            return false;
        };

        if let Some(last_logged) = ledger.last_logged.get(&kind) {
            if now - last_logged < self.log_throttle_seconds() {
                return false;
            }
        }

        let elapsed = (now - last_sent).max(0);
        let remaining = (self.cooldown_seconds - elapsed).max(0);
        info!(
            site = site_name,
            event = %kind,
            "[告警抑制] 站点 {} 的 {} 告警在 {} 秒前已发送，距离下一次通知还需约 {} 秒。",
            site_name,
            kind.status_label(),
            elapsed,
            remaining
        );
        ledger.last_logged.insert(kind, now);
        true
    }

    fn log_throttle_seconds(&self) -> i64 {
        self.cooldown_seconds
            .clamp(MIN_LOG_THROTTLE_SECONDS, MAX_LOG_THROTTLE_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_window() {
        let suppressor = AlertSuppressor::new(600);
        let mut ledger = SuppressionLedger::default();

        assert!(suppressor.should_send(&ledger, EventKind::Down, 0));
        suppressor.mark_sent(&mut ledger, EventKind::Down, 0);

        assert!(!suppressor.should_send(&ledger, EventKind::Down, 300));
        assert!(suppressor.should_send(&ledger, EventKind::Down, 600));
        assert!(suppressor.should_send(&ledger, EventKind::Down, 650));
        // 其他事件类型互不影响
        assert!(suppressor.should_send(&ledger, EventKind::Slow, 300));
    }

    #[test]
    fn test_zero_cooldown_always_permits() {
        let suppressor = AlertSuppressor::new(0);
        let mut ledger = SuppressionLedger::default();
        suppressor.mark_sent(&mut ledger, EventKind::Slow, 100);

        assert!(suppressor.should_send(&ledger, EventKind::Slow, 100));
        assert!(!suppressor.log_suppressed(&mut ledger, "shop", EventKind::Slow, 100));
    }

    #[test]
    fn test_suppression_log_throttled() {
        let suppressor = AlertSuppressor::new(600);
        let mut ledger = SuppressionLedger::default();

        // 从未发送过时不输出
        assert!(!suppressor.log_suppressed(&mut ledger, "shop", EventKind::Down, 10));

        suppressor.mark_sent(&mut ledger, EventKind::Down, 0);
        assert!(suppressor.log_suppressed(&mut ledger, "shop", EventKind::Down, 20));
        assert!(!suppressor.log_suppressed(&mut ledger, "shop", EventKind::Down, 200));
        assert!(suppressor.log_suppressed(&mut ledger, "shop", EventKind::Down, 320));
    }

    #[test]
    fn test_log_throttle_bounds() {
        assert_eq!(AlertSuppressor::new(10).log_throttle_seconds(), 30);
        assert_eq!(AlertSuppressor::new(120).log_throttle_seconds(), 120);
        assert_eq!(AlertSuppressor::new(3600).log_throttle_seconds(), 300);
    }
}
