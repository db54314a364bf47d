//! Push Events
//!
//! The event vocabulary sent over the push channel and the fan-out
//! broadcaster that delivers it to every connected listener.
//!
//! Every event is a small JSON object tagged by `type`:
//!
//! ```json
//! {"type": "ocr_chunk", "job_id": "3f2a9c1d0b7e", "file_id": "a1b2c3d4", "page": 2, "text": "Intro"}
//! ```

mod broadcaster;
mod types;

pub use broadcaster::{Broadcaster, Listener, ListenerId};
pub use types::Event;
