//! Record-page containers: a reconstructed complete page, or the
//! distinguished empty value meaning "this leaf does not exist in the
//! revision". The empty container is a legitimate successful result, not an
//! error.

use std::sync::Arc;

use crate::page::KeyValuePage;

#[derive(Debug, Clone, Default)]
pub struct RecordPageContainer {
    complete: Option<Arc<KeyValuePage>>,
}

impl RecordPageContainer {
    pub fn new(complete: KeyValuePage) -> Self {
        Self {
            complete: Some(Arc::new(complete)),
        }
    }

    /// The empty sentinel.
    pub fn empty() -> Self {
        Self { complete: None }
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_none()
    }

    /// The complete page, `None` for the empty sentinel.
    pub fn complete(&self) -> Option<&Arc<KeyValuePage>> {
        self.complete.as_ref()
    }
}
