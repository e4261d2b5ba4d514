#![warn(missing_docs)]
//! Core library entry points for the fastharvest record harvester.

pub mod controls;
pub mod harvest;
pub mod logging;
pub mod pacing;
pub mod record;
pub mod runtime;
pub mod sink;
pub mod source;

pub use controls::{Cli, HarvestControls};
pub use harvest::{HarvestError, HarvestOutcome, HarvestSummary, Harvester};
pub use pacing::{DelayPolicy, Pacer, TokioPacer, VirtualPacer};
pub use record::{Cursor, Page, Record, SequencedRecord};
pub use runtime::run as run_harvester;
pub use sink::{CsvSink, RecordSink, SinkError, HEADER};
pub use source::{
    HttpSearchClient, RateLimitSignal, Session, SessionError, SourceClient, SourceError,
};
