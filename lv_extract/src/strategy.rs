use lv_types::ContentType;

/// Which fetch protocol the orchestrator drives for a content type (§4.4
/// strategy selection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    Parallel,
    Sequential,
}

pub fn select_strategy(content_type: ContentType, workers: usize) -> FetchStrategy {
    if workers > 1 && content_type.supports_parallel_fetch() {
        FetchStrategy::Parallel
    } else {
        FetchStrategy::Sequential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_is_always_sequential() {
        assert_eq!(
            select_strategy(ContentType::Dashboard, 1),
            FetchStrategy::Sequential
        );
    }

    #[test]
    fn paginated_types_go_parallel_with_multiple_workers() {
        assert_eq!(
            select_strategy(ContentType::Dashboard, 8),
            FetchStrategy::Parallel
        );
    }

    #[test]
    fn non_paginated_types_stay_sequential() {
        assert_eq!(
            select_strategy(ContentType::ScheduledPlan, 8),
            FetchStrategy::Sequential
        );
    }
}
