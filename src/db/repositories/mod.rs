mod assessment_repository;
mod certificate_repository;
mod roster_repository;
mod session_repository;
mod standard_repository;
mod user_repository;

pub use assessment_repository::AssessmentRepository;
pub use certificate_repository::CertificateRepository;
pub use roster_repository::{RosterRepository, RowLock};
pub use session_repository::SessionRepository;
pub use standard_repository::StandardRepository;
pub use user_repository::UserRepository;
