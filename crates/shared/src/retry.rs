//! 退避策略
//!
//! 消费者在下游（数据库）出现瞬时故障时不提交位移、等待一段时间后重投同一条消息。
//! 等待时间按指数增长并封顶，成功一次后立即回落到下限，避免对故障依赖形成热循环。

use std::time::Duration;

/// 指数退避状态
///
/// 首次失败等待 `floor`，之后每次连续失败翻倍，直到 `ceiling` 为止。
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Default for Backoff {
    /// 默认策略：初始 200ms，上限 5s
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(5))
    }
}

impl Backoff {
    /// 创建退避状态；`ceiling` 小于 `floor` 时以 `floor` 为准
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    /// 下一次失败时应等待的时长
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 取出本次等待时长，并把下一次的等待时长翻倍（不超过上限）
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// 成功后回落到下限
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}
