//! Post-write effects
//!
//! Runs only after the write stream finished. A failed visibility change
//! fails the whole upload; the written object is left in place.

use super::EngineError;
use crate::store::ObjectHandle;

/// Host public object URLs are built on
pub const PUBLIC_URL_BASE: &str = "https://storage.googleapis.com";

/// Public URL of `container/key`. Both parts are used verbatim.
pub fn public_url(container: &str, key: &str) -> String {
    format!("{}/{}/{}", PUBLIC_URL_BASE, container, key)
}

/// Apply post-write effects, returning the public URL when one was made
pub(crate) async fn apply(
    object: &ObjectHandle,
    make_public: bool,
) -> Result<Option<String>, EngineError> {
    if !make_public {
        return Ok(None);
    }

    object
        .make_public()
        .await
        .map_err(EngineError::VisibilityChangeError)?;

    Ok(Some(public_url(object.container(), object.key())))
}
