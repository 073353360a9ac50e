//! `cuemark-core` -- domain types for the annotation automation engine.
//!
//! Pure and synchronous, with no internal dependencies, so the grammar and
//! recording model can be shared by the runtime, the persistence layer and
//! any tooling.

pub mod annotation;
pub mod error;
pub mod grammar;
pub mod recording;
pub mod serializer;
pub mod types;

pub use annotation::{Annotation, AnnotationSpec, PlaybackMode};
pub use error::CoreError;
pub use grammar::parse;
pub use recording::{RawEvent, RawEventKind, RecordingSession};
pub use serializer::serialize_session;
