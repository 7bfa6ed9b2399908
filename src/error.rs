use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsboxError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("url-translation error: {0}")]
    UrlTrans(#[from] urltrans::UrlTransError),
    #[error("db pool error: {0}")]
    DbPool(#[from] db_pool::DbPoolError),
    #[error("bearerbox link error: {0}")]
    Bearerbox(String),
    #[error("dlr back-end error: {0}")]
    Dlr(String),
    #[error("{0}")]
    Io(String),
}
