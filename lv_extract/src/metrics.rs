use std::sync::Arc;

use lv_metric::{Registry, U64Counter};

#[derive(Debug, Clone)]
pub(crate) struct ExtractionMetrics {
    pub items_extracted: Arc<U64Counter>,
    pub items_failed: Arc<U64Counter>,
}

impl ExtractionMetrics {
    pub(crate) fn new(registry: &Registry) -> Self {
        let extracted = registry
            .register_metric::<U64Counter>("extraction_items_total", "content items extracted");
        let failed = registry
            .register_metric::<U64Counter>("extraction_items_failed", "content items that failed extraction");
        Self {
            items_extracted: extracted.recorder(&[]),
            items_failed: failed.recorder(&[]),
        }
    }
}
