//! Quota usage logged at the end of a request.

use olapgate_core::QuotaForIntervals;
use std::time::SystemTime;
use tracing::info;

/// Log current usage for every interval of `quota`. Counters are not touched.
pub fn report(quota: &QuotaForIntervals) {
    if quota.is_empty() {
        return;
    }
    info!("Quota:\n{}", quota.render(SystemTime::now()));
}
