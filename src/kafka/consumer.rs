use crate::{PipelineError, Result};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use std::time::Duration;

/// One consumer group reading the topics behind a single queue.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let consumer: StreamConsumer = config.create()?;
        Ok(Self { consumer })
    }

    pub fn subscribe(&self, topics: &[&str]) -> Result<()> {
        self.consumer.subscribe(topics)?;
        Ok(())
    }

    /// Wait up to `poll` for the next record. `None` means nothing arrived.
    pub async fn recv_message(&self, poll: Duration) -> Result<Option<KafkaMessage>> {
        match tokio::time::timeout(poll, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(received) => received
                .map(|message| Some(KafkaMessage::from(&message)))
                .map_err(|e| PipelineError::TransientBroker(format!("receive failed: {}", e))),
        }
    }

    /// Commit past `message` so the group resumes after it.
    pub fn commit_message(&self, message: &KafkaMessage) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))?;
        self.consumer.commit(&offsets, CommitMode::Sync)?;
        Ok(())
    }
}

/// Owned copy of a received record. Keys and payloads are decoded as UTF-8, lossily.
#[derive(Debug, Clone)]
pub struct KafkaMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<String>,
}

impl From<&BorrowedMessage<'_>> for KafkaMessage {
    fn from(message: &BorrowedMessage<'_>) -> Self {
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(text),
            payload: message.payload().map(text),
        }
    }
}
