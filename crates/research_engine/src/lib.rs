//! Research engine: persistence, throttled inference and the batch orchestration loop.
mod content;
mod coordinator;
mod decode;
mod dispatcher;
mod engine;
mod events;
mod inference;
mod keys;
mod persist;
mod prompts;
mod rate_limit;
mod report;
mod settings;
mod store;
mod throttle;
mod token;

pub use content::{
    prepare_segment_content, ContentError, DirectoryContentProvider, SegmentContentProvider,
    MAX_SEGMENT_CONTENT,
};
pub use coordinator::{CoordinatorError, FailureSignal, LeadCoordinator};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use dispatcher::{BatchDispatcher, DispatchError, JobOutcome};
pub use engine::{generate_job_id, JobRequest, ResearchEngine};
pub use events::{LogProgressSink, NullProgressSink, ProgressSink, ResearchEvent};
pub use inference::{
    Completion, HttpInferenceClient, HttpInferenceSettings, InferenceBackend, InferenceError,
    InferenceFailureKind,
};
pub use keys::{content_hash, job_key, segment_key};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use rate_limit::{RateLimitError, RateLimitSettings, RateLimiter};
pub use report::{render_markdown, ReportFormat, ResearchReport};
pub use settings::{ResearchSettings, RunOverrides, SettingsError};
pub use store::{EvidenceStore, FileEvidenceStore, StoreError};
pub use throttle::{MeteredCompletion, ThrottledInference};
pub use token::{estimate_usage, TokenCounter, WhitespaceTokenCounter};
