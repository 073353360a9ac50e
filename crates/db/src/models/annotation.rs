//! Annotation row model.

use cuemark_core::types::{DbId, Timestamp};
use cuemark_core::{Annotation, AnnotationSpec, CoreError, PlaybackMode};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `annotations` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationRow {
    pub session_id: DbId,
    pub id: Uuid,
    pub document_index: i32,
    pub source_offset: i32,
    pub start_time: f64,
    pub end_time: f64,
    pub volume: i16,
    pub rate: f64,
    pub mode: String,
    pub pause_seconds: Option<i32>,
    pub created_at: Timestamp,
}

impl AnnotationRow {
    /// Rebuild the domain annotation, re-running every validation.
    ///
    /// A row whose id does not match its content was not written by a
    /// reconcile pass and is rejected.
    pub fn into_annotation(self) -> Result<Annotation, CoreError> {
        let document_index = u32::try_from(self.document_index)
            .map_err(|_| invalid("document_index", self.document_index))?;
        let source_offset = usize::try_from(self.source_offset)
            .map_err(|_| invalid("source_offset", self.source_offset))?;
        let volume = u8::try_from(self.volume).map_err(|_| invalid("volume", self.volume))?;
        let pause_seconds = match self.pause_seconds {
            Some(s) => Some(u32::try_from(s).map_err(|_| invalid("pause_seconds", s))?),
            None => None,
        };

        let annotation = AnnotationSpec {
            start_time: self.start_time,
            end_time: self.end_time,
            volume,
            rate: self.rate,
            mode: PlaybackMode::from_parts(&self.mode, pause_seconds)?,
        }
        .build(document_index, source_offset)?;

        if annotation.id != self.id {
            return Err(CoreError::Validation(format!(
                "annotation {} does not match its stored content",
                self.id
            )));
        }
        Ok(annotation)
    }
}

/// Column values for inserting an [`Annotation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationColumns {
    pub document_index: i32,
    pub source_offset: i32,
    pub volume: i16,
    pub pause_seconds: Option<i32>,
}

impl AnnotationColumns {
    pub fn from_annotation(annotation: &Annotation) -> Result<Self, CoreError> {
        let document_index = i32::try_from(annotation.document_index)
            .map_err(|_| invalid("document_index", annotation.document_index))?;
        let source_offset = i32::try_from(annotation.source_offset)
            .map_err(|_| invalid("source_offset", annotation.source_offset))?;
        let pause_seconds = match annotation.mode {
            PlaybackMode::Pause { seconds } => {
                Some(i32::try_from(seconds).map_err(|_| invalid("pause_seconds", seconds))?)
            }
            _ => None,
        };

        Ok(Self {
            document_index,
            source_offset,
            volume: i16::from(annotation.volume),
            pause_seconds,
        })
    }
}

fn invalid(column: &str, value: impl std::fmt::Display) -> CoreError {
    CoreError::Validation(format!("{column} out of range: {value}"))
}
