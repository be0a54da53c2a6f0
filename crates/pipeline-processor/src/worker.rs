//! 워커 풀 -- 입력 채널의 메시지 배치를 여러 태스크가 나눠 처리합니다.
//!
//! 워커마다 한 번에 한 배치만 처리합니다. 평가는 동기적으로 실행되며
//! 워커 사이에 공유되는 가변 상태는 입력 수신측 하나뿐입니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ironpipe_core::message::Message;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::interpreter::MessageProcessor;

/// 워커 풀 핸들
pub struct ProcessorWorkers {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    batches_processed: Arc<AtomicU64>,
}

/// 워커 풀과 입출력 채널
pub struct WorkerChannels {
    /// 처리할 배치를 보내는 쪽
    pub input: mpsc::Sender<Vec<Message>>,
    /// 처리된 배치를 받는 쪽
    pub output: mpsc::Receiver<Vec<Message>>,
}

impl ProcessorWorkers {
    /// `worker_count`개의 워커를 띄웁니다.
    ///
    /// # Errors
    /// 워커 수나 채널 용량이 0인 경우
    pub fn spawn(
        processor: Arc<dyn MessageProcessor>,
        config: &ProcessorConfig,
    ) -> Result<(Self, WorkerChannels), ProcessorError> {
        if config.worker_count == 0 {
            return Err(ProcessorError::Config {
                field: "worker_count".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if config.channel_capacity == 0 {
            return Err(ProcessorError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let (input_tx, input_rx) = mpsc::channel(config.channel_capacity);
        let (output_tx, output_rx) = mpsc::channel(config.channel_capacity);
        let input_rx = Arc::new(Mutex::new(input_rx));
        let cancel = CancellationToken::new();
        let batches_processed = Arc::new(AtomicU64::new(0));

        let tasks = (0..config.worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&processor),
                    Arc::clone(&input_rx),
                    output_tx.clone(),
                    cancel.clone(),
                    Arc::clone(&batches_processed),
                ))
            })
            .collect();

        tracing::info!(workers = config.worker_count, "processor workers started");

        Ok((
            Self {
                cancel,
                tasks,
                batches_processed,
            },
            WorkerChannels {
                input: input_tx,
                output: output_rx,
            },
        ))
    }

    pub fn worker_count(&self) -> usize {
        self.tasks.len()
    }

    /// 지금까지 처리한 배치 수
    pub fn batches_processed(&self) -> u64 {
        self.batches_processed.load(Ordering::Relaxed)
    }

    /// 워커를 멈추고 종료를 기다립니다. 처리 중인 배치는 끝까지 처리됩니다.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "processor worker terminated abnormally");
            }
        }
        tracing::info!("processor workers stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    processor: Arc<dyn MessageProcessor>,
    input: Arc<Mutex<mpsc::Receiver<Vec<Message>>>>,
    output: mpsc::Sender<Vec<Message>>,
    cancel: CancellationToken,
    batches_processed: Arc<AtomicU64>,
) {
    loop {
        let batch = {
            let mut rx = input.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                batch = rx.recv() => batch,
            }
        };
        let Some(batch) = batch else {
            break;
        };

        let count = batch.len();
        let processed = processor.process(batch);
        batches_processed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            worker_id,
            input = count,
            output = processed.len(),
            "batch processed"
        );

        if output.send(processed).await.is_err() {
            tracing::warn!(worker_id, "output channel closed, stopping worker");
            break;
        }
    }
    tracing::debug!(worker_id, "processor worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 필드를 하나 붙이는 테스트용 프로세서
    struct Tagging;

    impl MessageProcessor for Tagging {
        fn process(&self, messages: Vec<Message>) -> Vec<Message> {
            messages
                .into_iter()
                .map(|m| m.with_field("tagged", true))
                .collect()
        }
    }

    fn config(workers: usize) -> ProcessorConfig {
        ProcessorConfig {
            worker_count: workers,
            channel_capacity: 16,
            ..ProcessorConfig::default()
        }
    }

    #[tokio::test]
    async fn workers_process_all_batches() {
        let (workers, mut channels) =
            ProcessorWorkers::spawn(Arc::new(Tagging), &config(4)).unwrap();
        assert_eq!(workers.worker_count(), 4);

        for i in 0..10 {
            channels
                .input
                .send(vec![Message::with_id(format!("m{i}"))])
                .await
                .unwrap();
        }

        let mut ids = Vec::new();
        for _ in 0..10 {
            let batch = channels.output.recv().await.unwrap();
            assert!(batch[0].has_field("tagged"));
            ids.push(batch[0].id().to_owned());
        }
        ids.sort();
        assert_eq!(ids.len(), 10);
        assert_eq!(workers.batches_processed(), 10);

        workers.shutdown().await;
    }

    #[tokio::test]
    async fn workers_exit_when_input_closes() {
        let (workers, channels) = ProcessorWorkers::spawn(Arc::new(Tagging), &config(2)).unwrap();
        drop(channels.input);
        for task in workers.tasks {
            task.await.unwrap();
        }
    }

    #[test]
    fn zero_workers_rejected() {
        let result = ProcessorWorkers::spawn(Arc::new(Tagging), &config(0));
        assert!(matches!(result, Err(ProcessorError::Config { .. })));
    }
}
