//! Audit annotations on the call's tracing span.
//!
//! Fire-and-forget: a failed annotation is logged at `debug` and otherwise
//! ignored. It never influences an authorization decision.
use thiserror::Error;
use tracing::debug;

use crate::rpc::context::CallContext;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("span is not recording")]
    NotRecording,
    #[error("unknown annotation key '{0}'")]
    UnknownKey(String),
}

/// Tracing/observability sink.
pub trait Annotator: Send + Sync {
    fn annotate(&self, ctx: &CallContext, key: &str, value: &str) -> Result<(), AnnotationError>;
}

/// Records annotations as fields of the call's `rpc` span.
///
/// Only fields declared when the span was opened (`user`, `org`) can be set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanAnnotator;

impl Annotator for SpanAnnotator {
    fn annotate(&self, ctx: &CallContext, key: &str, value: &str) -> Result<(), AnnotationError> {
        let span = ctx.span();
        if span.is_disabled() {
            return Err(AnnotationError::NotRecording);
        }
        if span.field(key).is_none() {
            return Err(AnnotationError::UnknownKey(key.to_string()));
        }

        span.record(key, value);
        Ok(())
    }
}

/// Drops every annotation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnnotator;

impl Annotator for NoopAnnotator {
    fn annotate(&self, _: &CallContext, _: &str, _: &str) -> Result<(), AnnotationError> {
        Ok(())
    }
}

pub fn annotate_best_effort(annotator: &dyn Annotator, ctx: &CallContext, key: &str, value: &str) {
    if let Err(e) = annotator.annotate(ctx, key, value) {
        debug!(error = %e, key, "annotation dropped");
    }
}
