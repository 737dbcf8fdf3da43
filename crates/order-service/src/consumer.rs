//! 订单事件消费循环
//!
//! 一次只处理一条消息，结论决定位移是否提交：
//! - 处理成功：提交，退避回落到下限
//! - 坏消息：提交并越过，永不重试，退避同样回落到下限
//! - 内部错误：不提交，按指数退避等待后重投同一条消息
//!
//! 拉取、处理、退避等待三个阶段都与关闭信号竞争，关闭信号优先。
//! 被中断时尚未提交的消息会在下次启动后重新投递，写入是幂等的。

use std::sync::Arc;
use std::time::Duration;

use order_shared::kafka::{ConsumerMessage, MessageSource};
use order_shared::retry::Backoff;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, IngestError};
use crate::service::OrderIngestor;

/// 单步处理的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 处理成功并已尝试提交
    Committed,
    /// 坏消息，已提交并越过
    Skipped,
    /// 处理或拉取失败，已等待 `delay` 后准备重试
    Retried { delay: Duration },
    /// 收到关闭信号
    Stopped,
}

/// 订单消费者
pub struct OrderConsumer<M, I> {
    source: M,
    ingestor: Arc<I>,
    backoff: Backoff,
    /// 处理失败、等待重投的消息
    pending: Option<ConsumerMessage>,
    shutdown: watch::Receiver<bool>,
}

impl<M, I> OrderConsumer<M, I>
where
    M: MessageSource,
    I: OrderIngestor,
{
    pub fn new(
        source: M,
        ingestor: Arc<I>,
        backoff: Backoff,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            ingestor,
            backoff,
            pending: None,
            shutdown,
        }
    }

    /// 启动消费循环，直到收到关闭信号
    pub async fn run(mut self) {
        info!("订单消费者已启动");

        loop {
            if self.step().await == StepOutcome::Stopped {
                break;
            }
        }

        if let Some(msg) = &self.pending {
            info!(
                partition = msg.partition,
                offset = msg.offset,
                "存在未提交消息，将在重启后重投"
            );
        }
        info!("订单消费者已停止");
    }

    /// 处理一条消息（或重投上一次失败的消息）
    pub async fn step(&mut self) -> StepOutcome {
        if *self.shutdown.borrow() {
            return StepOutcome::Stopped;
        }

        let msg = match self.pending.take() {
            Some(msg) => msg,
            None => {
                let fetched = tokio::select! {
                    biased;
                    _ = wait_shutdown(&mut self.shutdown) => return StepOutcome::Stopped,
                    fetched = self.source.fetch() => fetched,
                };

                match fetched {
                    Ok(msg) => msg,
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        warn!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "拉取消息失败，稍后重试"
                        );
                        return self.sleep(delay).await;
                    }
                }
            }
        };

        let result = tokio::select! {
            biased;
            _ = wait_shutdown(&mut self.shutdown) => None,
            result = self.ingestor.ingest(&msg.payload) => Some(result),
        };
        let Some(result) = result else {
            self.pending = Some(msg);
            return StepOutcome::Stopped;
        };

        match result {
            Ok(()) => {
                self.commit(&msg).await;
                self.backoff.reset();
                StepOutcome::Committed
            }
            Err(e) if e.kind() == ErrorKind::BadPayload => {
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    value = %String::from_utf8_lossy(&msg.payload),
                    error = %e,
                    "bad message, skipped"
                );
                self.commit(&msg).await;
                self.backoff.reset();
                StepOutcome::Skipped
            }
            Err(e) => self.retry_later(msg, &e).await,
        }
    }

    async fn retry_later(&mut self, msg: ConsumerMessage, err: &IngestError) -> StepOutcome {
        let delay = self.backoff.next_delay();
        error!(
            partition = msg.partition,
            offset = msg.offset,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "failed to handle message, retry"
        );
        self.pending = Some(msg);
        self.sleep(delay).await
    }

    /// 提交失败只记录日志，不影响后续消费
    async fn commit(&mut self, msg: &ConsumerMessage) {
        match self.source.commit(msg).await {
            Ok(()) => debug!(partition = msg.partition, offset = msg.offset, "消息已提交"),
            Err(e) => error!(
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "commit error"
            ),
        }
    }

    async fn sleep(&mut self, delay: Duration) -> StepOutcome {
        tokio::select! {
            biased;
            _ = wait_shutdown(&mut self.shutdown) => StepOutcome::Stopped,
            _ = tokio::time::sleep(delay) => StepOutcome::Retried { delay },
        }
    }
}

/// 等待关闭信号；发送端被丢弃同样视为关闭
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
