//! Event vocabulary

use serde::Serialize;

use crate::jobs::{JobStatus, ResultRecord};

/// A push-channel message
///
/// The set is append-only; clients ignore types they do not know.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Pending list length changed (enqueue or dequeue)
    QueueUpdate { queue_length: usize },

    /// Job moved to running
    JobStatus {
        job_id: String,
        status: JobStatus,
        progress: u8,
    },

    /// A file is about to start
    JobProgress {
        job_id: String,
        progress: u8,
        current_file: String,
    },

    /// One decoded fragment of model output
    OcrChunk {
        job_id: String,
        file_id: String,
        page: Option<u32>,
        text: String,
    },

    /// One PDF page finished
    PageComplete {
        job_id: String,
        file_id: String,
        page: u32,
        result: ResultRecord,
    },

    /// One non-PDF file finished
    FileComplete {
        job_id: String,
        file_id: String,
        result: ResultRecord,
    },

    /// Terminal success, full or partial
    JobComplete {
        job_id: String,
        status: JobStatus,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },

    /// Terminal failure
    JobError { job_id: String, error: String },
}

impl Event {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Event::QueueUpdate { .. } => "queue_update",
            Event::JobStatus { .. } => "job_status",
            Event::JobProgress { .. } => "job_progress",
            Event::OcrChunk { .. } => "ocr_chunk",
            Event::PageComplete { .. } => "page_complete",
            Event::FileComplete { .. } => "file_complete",
            Event::JobComplete { .. } => "job_complete",
            Event::JobError { .. } => "job_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_serialization() {
        let event = Event::OcrChunk {
            job_id: "job1".to_string(),
            file_id: "file1".to_string(),
            page: None,
            text: "Hello".to_string(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ocr_chunk",
                "job_id": "job1",
                "file_id": "file1",
                "page": null,
                "text": "Hello"
            })
        );
        assert_eq!(event.kind(), "ocr_chunk");
    }

    #[test]
    fn test_job_complete_warning_is_optional() {
        let full = Event::JobComplete {
            job_id: "j".to_string(),
            status: JobStatus::Completed,
            progress: 100,
            warning: None,
        };
        let value = serde_json::to_value(&full).unwrap();
        assert!(value.get("warning").is_none());
        assert_eq!(value["status"], "completed");

        let partial = Event::JobComplete {
            job_id: "j".to_string(),
            status: JobStatus::CompletedWithWarnings,
            progress: 100,
            warning: Some("1 file(s) failed: b.png".to_string()),
        };
        let value = serde_json::to_value(&partial).unwrap();
        assert_eq!(value["status"], "completed-with-warnings");
        assert_eq!(value["warning"], "1 file(s) failed: b.png");
    }

    #[test]
    fn test_page_complete_carries_record() {
        let event = Event::PageComplete {
            job_id: "j".to_string(),
            file_id: "f".to_string(),
            page: 3,
            result: ResultRecord::new("doc_page_3.md", "# doc - Page 3\n\ntext", Vec::new())
                .with_page(3),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "page_complete");
        assert_eq!(value["result"]["outName"], "doc_page_3.md");
        assert_eq!(value["result"]["page"], 3);
        assert_eq!(value["result"]["originalMd"], value["result"]["md"]);
    }
}
