//! Generic error handling.

/// A generic error.
///
/// Used wherever callers only need to log or count a failure rather than discriminate on it,
/// such as transport and flush plumbing. Carries context attached via `anyhow::Context`.
pub type GenericError = anyhow::Error;
