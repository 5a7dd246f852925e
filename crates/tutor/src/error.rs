use nimbus_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("melody mode stays locked until every cloud is mastered")]
    MelodyLocked,
}
