#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("unknown source format '{0}'")]
    UnknownFormat(String),
    #[error("unknown resolution '{0}'")]
    UnknownResolution(String),
}
