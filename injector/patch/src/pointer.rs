use json_patch::jsonptr::PointerBuf;
use std::borrow::Cow;

/// Escapes a single reference token for embedding in a JSON Pointer.
///
/// `~` is replaced before `/` so that the `~` introduced by `~1` is never
/// re-escaped.
pub fn escape(token: &str) -> Cow<'_, str> {
    if !token.contains(['~', '/']) {
        return Cow::Borrowed(token);
    }
    Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
}

/// Parses an already-escaped pointer string.
pub(crate) fn parse(path: String) -> Result<PointerBuf, InvalidPointer> {
    PointerBuf::parse(path.as_str()).map_err(|error| InvalidPointer {
        reason: error.to_string(),
        path,
    })
}

#[derive(Debug, thiserror::Error)]
#[error("invalid patch path {path:?}: {reason}")]
pub struct InvalidPointer {
    path: String,
    reason: String,
}
