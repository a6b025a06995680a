//! Training session lifecycle and certificate eligibility engine.
//!
//! Authorization-agnostic: callers check capabilities before invoking any
//! operation and forward the returned audit detail to their audit sink.

pub mod assessment;
pub mod attendance;
pub mod audit;
pub mod catalog;
pub mod certificate;
pub mod clock;
pub mod compliance;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod roster;
pub mod store;

use std::sync::Arc;

pub use assessment::{AssessmentRecorder, BulkRecordReport, BulkRow, RowOutcome};
pub use attendance::{AttendanceSummary, AttendanceTracker};
pub use audit::{Actor, AuditOperation, AuditRecord, AuditTarget, Audited, Role};
pub use catalog::StandardCatalog;
pub use certificate::{
    CertificateCodeGenerator, CertificateIssuer, CertificatePolicy, CertificateView,
    IssuanceOutcome, IssuanceReport, RandomCodeGenerator,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use compliance::{ComplianceAggregator, ComplianceReport};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{LifecycleController, SessionTransition};
pub use memory::InMemoryStore;
pub use roster::RosterManager;
pub use store::{CertificateInsert, EntityStore};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub certificate_code_prefix: String,
    pub certificates: CertificatePolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            certificate_code_prefix: "ATC".to_string(),
            certificates: CertificatePolicy::default(),
        }
    }
}

/// All engine components wired to one store and one clock.
pub struct TrainingEngine {
    pub catalog: StandardCatalog,
    pub lifecycle: LifecycleController,
    pub roster: RosterManager,
    pub attendance: AttendanceTracker,
    pub assessments: AssessmentRecorder,
    pub certificates: CertificateIssuer,
    pub compliance: ComplianceAggregator,
}

impl TrainingEngine {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        let codes = Arc::new(RandomCodeGenerator::new(settings.certificate_code_prefix));
        Self::with_code_generator(store, clock, codes, settings.certificates)
    }

    pub fn with_code_generator(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        codes: Arc<dyn CertificateCodeGenerator>,
        policy: CertificatePolicy,
    ) -> Self {
        let window = policy.expiring_window_months;
        Self {
            catalog: StandardCatalog::new(store.clone(), clock.clone()),
            lifecycle: LifecycleController::new(store.clone(), clock.clone()),
            roster: RosterManager::new(store.clone(), clock.clone()),
            attendance: AttendanceTracker::new(store.clone(), clock.clone()),
            assessments: AssessmentRecorder::new(store.clone(), clock.clone()),
            certificates: CertificateIssuer::new(store.clone(), clock.clone(), codes, policy),
            compliance: ComplianceAggregator::new(store, clock, window),
        }
    }
}
