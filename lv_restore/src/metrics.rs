use std::sync::Arc;

use lv_metric::{Registry, U64Counter};

#[derive(Debug, Clone)]
pub(crate) struct RestorationMetrics {
    pub items_restored: Arc<U64Counter>,
    pub items_failed: Arc<U64Counter>,
    pub items_dead_lettered: Arc<U64Counter>,
}

impl RestorationMetrics {
    pub(crate) fn new(registry: &Registry) -> Self {
        let restored = registry
            .register_metric::<U64Counter>("restoration_items_total", "content items restored");
        let failed = registry
            .register_metric::<U64Counter>("restoration_items_failed", "content items that failed restoration");
        let dead_lettered = registry.register_metric::<U64Counter>(
            "restoration_items_dead_lettered",
            "content items routed to the dead letter queue",
        );
        Self {
            items_restored: restored.recorder(&[]),
            items_failed: failed.recorder(&[]),
            items_dead_lettered: dead_lettered.recorder(&[]),
        }
    }
}
