use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::models::{Certificate, CertificateStatus};

use super::certificate::classify;
use super::clock::Clock;
use super::error::EngineResult;
use super::store::EntityStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub organization_id: Uuid,
    pub total: usize,
    pub valid: usize,
    pub expiring: usize,
    pub expired: usize,
    pub revoked: usize,
    /// Soonest expiry first.
    pub expiring_certificates: Vec<Certificate>,
    /// Longest lapsed first.
    pub expired_certificates: Vec<Certificate>,
}

impl ComplianceReport {
    pub fn empty(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            ..Default::default()
        }
    }

    /// Share of live certificates that are still in date, if any exist.
    pub fn compliance_rate(&self) -> Option<f64> {
        let live = self.total - self.revoked;
        (live > 0).then(|| (self.valid + self.expiring) as f64 / live as f64)
    }
}

/// Read-side projection over an organization's certificates.
pub struct ComplianceAggregator {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    expiring_window_months: i32,
}

impl ComplianceAggregator {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, expiring_window_months: i32) -> Self {
        Self {
            store,
            clock,
            expiring_window_months,
        }
    }

    #[instrument(skip(self))]
    pub async fn aggregate_for_organization(&self, organization_id: Uuid) -> EngineResult<ComplianceReport> {
        let certificates = self
            .store
            .list_certificates_for_organization(organization_id)
            .await?;
        let today = self.clock.today();

        let mut report = ComplianceReport::empty(organization_id);
        for certificate in certificates {
            report.total += 1;
            match classify(&certificate, today, self.expiring_window_months) {
                CertificateStatus::Valid => report.valid += 1,
                CertificateStatus::Expiring => {
                    report.expiring += 1;
                    report.expiring_certificates.push(certificate);
                }
                CertificateStatus::Expired => {
                    report.expired += 1;
                    report.expired_certificates.push(certificate);
                }
                CertificateStatus::Revoked => report.revoked += 1,
            }
        }

        report.expiring_certificates.sort_by_key(|c| c.expiry_date);
        report.expired_certificates.sort_by_key(|c| c.expiry_date);

        debug!(
            %organization_id,
            total = report.total,
            expiring = report.expiring,
            expired = report.expired,
            "Compliance aggregated"
        );
        Ok(report)
    }
}
