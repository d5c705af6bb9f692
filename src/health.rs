//! Process-wide service health tracking.
//!
//! Every cascade attempt reports its outcome here under the producing
//! service's name. The registry derives ONLINE/DEGRADED/OFFLINE per
//! service and a STABLE/CRITICAL aggregate. All mutation happens under a
//! single mutex with map-update-only critical sections; reads hand out
//! snapshot copies, never the live map.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::model::{ServiceHealthRecord, ServiceStatus, StatusReport, SystemStatus};

/// Consecutive failures beyond this flip a service to OFFLINE.
const OFFLINE_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
pub struct HealthRegistry {
    inner: Mutex<BTreeMap<String, ServiceHealthRecord>>,
}

impl HealthRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeMap<String, ServiceHealthRecord>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a successful execution: failures reset to zero, status back
    /// to ONLINE. Prior failure history stays on the record for
    /// diagnostics.
    pub fn report_success(&self, service: &str) {
        let mut map = self.guard();
        let record = map.entry(service.to_owned()).or_insert_with(fresh_record);
        record.status = ServiceStatus::Online;
        record.consecutive_failures = 0;
        record.last_success = Some(Utc::now());
    }

    /// Record a failed execution. The service degrades immediately and
    /// goes OFFLINE once the consecutive-failure threshold is exceeded.
    pub fn report_failure(&self, service: &str, error: &str) {
        let failures = {
            let mut map = self.guard();
            let record = map.entry(service.to_owned()).or_insert_with(fresh_record);
            record.status = ServiceStatus::Degraded;
            record.consecutive_failures += 1;
            record.last_failure = Some(Utc::now());
            record.last_error = Some(error.to_owned());
            if record.consecutive_failures > OFFLINE_THRESHOLD {
                record.status = ServiceStatus::Offline;
            }
            record.consecutive_failures
        };
        tracing::error!(service, failures, error, "service reported failure");
    }

    /// Snapshot of one service's record, if it has ever reported.
    #[must_use]
    pub fn record(&self, service: &str) -> Option<ServiceHealthRecord> {
        self.guard().get(service).cloned()
    }

    /// Aggregate snapshot: CRITICAL if any service is OFFLINE, STABLE
    /// otherwise. The returned map is a copy.
    #[must_use]
    pub fn status_report(&self) -> StatusReport {
        let services = self.guard().clone();
        let system_status = if services
            .values()
            .any(|record| record.status == ServiceStatus::Offline)
        {
            SystemStatus::Critical
        } else {
            SystemStatus::Stable
        };
        StatusReport {
            system_status,
            services,
            generated_at: Utc::now(),
        }
    }
}

fn fresh_record() -> ServiceHealthRecord {
    ServiceHealthRecord {
        status: ServiceStatus::Online,
        consecutive_failures: 0,
        last_success: None,
        last_failure: None,
        last_error: None,
    }
}
