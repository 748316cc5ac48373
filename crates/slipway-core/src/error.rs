use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlipwayError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: field '{field}' {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("unknown environment '{0}': no cluster address configured")]
    UnknownEnvironment(String),

    #[error("unable to find job template: {0}")]
    TemplateNotFound(PathBuf),

    #[error(transparent)]
    Render(#[from] crate::render::RenderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SlipwayError>;
