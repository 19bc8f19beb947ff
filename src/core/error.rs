//! Request resolution errors.
//!
//! Every variant ends a single request. The dispatcher and the style cache
//! turn them into terminal outcomes, they never escape to the user except
//! as a not-found notice in direct mode.

use thiserror::Error;

use crate::archive::ArchiveError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no entry for `{0}`")]
    NotFound(String),

    #[error("redirect chain from `{0}` does not resolve")]
    RedirectUnresolved(String),

    #[error("`{path}` could not be decoded as {expected}")]
    DecodeFailure {
        path: String,
        expected: &'static str,
    },

    #[error("transform of `{0}` timed out")]
    TransformTimeout(String),

    #[error("stylesheet `{0}` could not be read")]
    CacheDecodeFailure(String),

    #[error("transform for `{delivered}` delivered to request for `{expected}`")]
    WrongTransform { expected: String, delivered: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ResolveError::WrongTransform {
            expected: "A/One".into(),
            delivered: "A/Two".into(),
        };
        assert_eq!(
            err.to_string(),
            "transform for `A/Two` delivered to request for `A/One`"
        );
        assert_eq!(
            ResolveError::NotFound("A/X".into()).to_string(),
            "no entry for `A/X`"
        );
    }
}
