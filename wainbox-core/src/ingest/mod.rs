// src/ingest/mod.rs

pub mod payload;
pub mod normalizer;
pub mod reconciler;
pub mod source;
pub mod driver;

pub use driver::{IngestionDriver, RunReport, SourceOutcome, SourceReport};
pub use normalizer::{BatchOutcome, MessageNormalizer, MessageOutcome};
pub use payload::{classify, Payload, PayloadKind, StatusUpdate, WebhookBatch};
pub use reconciler::{ReconcileOutcome, StatusOutcome, StatusReconciler};
pub use source::{sources_from_dir, FileSource, InlineSource, PayloadSource};
