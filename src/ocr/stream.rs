//! Stream bridge
//!
//! Runs one blocking inference call on the blocking thread pool and turns
//! each fragment it reports into an `ocr_chunk` event. The worker thread only
//! pushes into an unbounded channel; a forwarder task on the runtime owns the
//! broadcast, so fragments arrive in order and none are dropped.

use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::events::{Broadcaster, Event};

/// Tags and forwards the fragments of one inference stream
pub struct StreamBridge {
    broadcaster: Broadcaster,
    job_id: String,
    file_id: String,
    page: Option<u32>,
}

impl StreamBridge {
    /// `page` is 1-indexed and `None` for non-PDF files
    pub fn new(broadcaster: Broadcaster, job_id: &str, file_id: &str, page: Option<u32>) -> Self {
        Self {
            broadcaster,
            job_id: job_id.to_string(),
            file_id: file_id.to_string(),
            page,
        }
    }

    /// Run `work` on a worker thread, handing it the fragment callback.
    ///
    /// Resolves once `work` has returned and every fragment it reported has
    /// been broadcast. Fails only if the worker panicked.
    pub async fn run<T, F>(self, work: F) -> Result<T, JoinError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn FnMut(&str)) -> T + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let StreamBridge { broadcaster, job_id, file_id, page } = self;
        let forwarder = tokio::spawn(async move {
            let mut forwarded = 0usize;
            while let Some(text) = rx.recv().await {
                broadcaster.broadcast(&Event::OcrChunk {
                    job_id: job_id.clone(),
                    file_id: file_id.clone(),
                    page,
                    text,
                });
                forwarded += 1;
            }
            forwarded
        });

        let result = tokio::task::spawn_blocking(move || {
            let mut on_fragment = |text: &str| {
                if !text.is_empty() {
                    // Receiver lives until this sender is dropped
                    let _ = tx.send(text.to_string());
                }
            };
            work(&mut on_fragment)
        })
        .await;

        // The sender was dropped with the closure, so the forwarder drains
        // what is buffered and stops
        match forwarder.await {
            Ok(count) => tracing::trace!(fragments = count, "Stream forwarded"),
            Err(e) => tracing::warn!("Stream forwarder stopped: {}", e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fragments_are_tagged_and_ordered() {
        let broadcaster = Broadcaster::new();
        let mut listener = broadcaster.register();
        let bridge = StreamBridge::new(broadcaster.clone(), "job1", "file1", Some(2));

        let output = bridge
            .run(|on_fragment| {
                for i in 0..50 {
                    on_fragment(&format!("t{} ", i));
                }
                "done".to_string()
            })
            .await
            .unwrap();
        assert_eq!(output, "done");

        // Every fragment is already delivered when run returns
        for i in 0..50 {
            let msg = listener.receiver.try_recv().unwrap();
            let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
            assert_eq!(value["type"], "ocr_chunk");
            assert_eq!(value["job_id"], "job1");
            assert_eq!(value["file_id"], "file1");
            assert_eq!(value["page"], 2);
            assert_eq!(value["text"], format!("t{} ", i));
        }
        assert!(listener.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_worker_result_is_returned_on_error() {
        let broadcaster = Broadcaster::new();
        let mut listener = broadcaster.register();
        let bridge = StreamBridge::new(broadcaster, "job1", "file1", None);

        let output: Result<(), String> = bridge
            .run(|on_fragment| {
                on_fragment("partial");
                Err("model crashed".to_string())
            })
            .await
            .unwrap();
        assert_eq!(output, Err("model crashed".to_string()));

        let msg = listener.receiver.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert!(value["page"].is_null());
        assert_eq!(value["text"], "partial");
    }

    #[tokio::test]
    async fn test_panicking_worker_reports_join_error() {
        let bridge = StreamBridge::new(Broadcaster::new(), "j", "f", None);
        let result = bridge
            .run(|_| -> () { panic!("worker died") })
            .await;
        assert!(result.is_err());
    }
}
