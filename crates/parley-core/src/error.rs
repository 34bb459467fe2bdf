use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },
    #[error("Unreadable .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
