//! `StringOperations` namespace.

use crate::dispatch::{HandlerError, RequestContext};

/// Counts the Unicode scalar values of the first argument.
///
/// # Errors
///
/// Returns an invalid-params error when no argument was supplied.
pub fn count_string(_context: &RequestContext, args: Vec<String>) -> Result<usize, HandlerError> {
    let first = args
        .first()
        .ok_or_else(|| HandlerError::invalid_params("no string provided"))?;
    Ok(first.chars().count())
}
