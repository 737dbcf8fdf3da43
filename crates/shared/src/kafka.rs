//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为"拉取一条 / 提交一条"的消息源抽象。
//! 位移只在业务处理得出结论后手动提交，自动提交与自动存储位移均关闭，
//! 由上层决定哪些消息可以越过、哪些必须重投。

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::KafkaConfig;
use crate::error::InfraError;

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息
///
/// 只保留处理与提交所需的字段。拥有所有权，可以跨 await 点持有，
/// 处理失败时原样保留以便重投。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    /// 提交时写入的位移：Kafka 语义下提交的是"下一条要消费的位置"
    pub fn next_offset(&self) -> i64 {
        self.offset + 1
    }
}

// ---------------------------------------------------------------------------
// MessageSource
// ---------------------------------------------------------------------------

/// 可拉取、可手动提交的消息源
///
/// 消费循环只依赖这个 trait，测试中可以用内存队列替换真实的 Kafka。
#[async_trait]
pub trait MessageSource: Send {
    /// 阻塞直到拿到下一条消息
    async fn fetch(&mut self) -> Result<ConsumerMessage, InfraError>;

    /// 提交该消息的位移，之后它不会再被投递给本消费组
    async fn commit(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError>;
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 手动提交位移的 Kafka 消费者
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// 根据配置创建消费者
    pub fn new(config: &KafkaConfig) -> Result<Self, InfraError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .create()
            .map_err(|e| InfraError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.consumer_group,
            "Kafka 消费者已初始化"
        );
        Ok(Self { consumer })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), InfraError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| InfraError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn fetch(&mut self) -> Result<ConsumerMessage, InfraError> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| InfraError::Kafka(format!("接收消息失败: {e}")))?;
        let msg = ConsumerMessage::from_borrowed(&borrowed);

        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "收到 Kafka 消息"
        );
        Ok(msg)
    }

    async fn commit(&mut self, msg: &ConsumerMessage) -> Result<(), InfraError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.next_offset()))
            .map_err(|e| InfraError::Kafka(format!("构造提交位移失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| InfraError::Kafka(format!("提交位移失败: {e}")))?;

        debug!(
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            "位移已提交"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn message(offset: i64) -> ConsumerMessage {
        ConsumerMessage {
            topic: "orders".to_string(),
            partition: 0,
            offset,
            payload: br#"{"order_uid":"b563feb7b2b84b6test"}"#.to_vec(),
        }
    }

    #[test]
    fn test_next_offset_points_past_message() {
        assert_eq!(message(0).next_offset(), 1);
        assert_eq!(message(41).next_offset(), 42);
    }
}
