use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LineageError {
    #[error("failed to read input file {path}: {reason}")]
    #[diagnostic(help("check that the metadata file exists and is readable"))]
    InputRead { path: PathBuf, reason: String },

    #[error("input file {0} has no header line")]
    #[diagnostic(help("the first line must name the tab-separated columns"))]
    MissingHeader(PathBuf),

    #[error("failed to tokenize TSV input: {0}")]
    InputParse(String),

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("database connection failed: {0}")]
    #[diagnostic(help("check --uri / LINEAGE_SYNC_URI and that the server is reachable"))]
    Connection(String),

    #[error("bulk update request failed: {0}")]
    BulkRequest(String),

    #[error("bulk update failed for {failed} of {total} operations")]
    Write { failed: usize, total: usize },
}

impl LineageError {
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            LineageError::InputRead { .. }
                | LineageError::MissingHeader(_)
                | LineageError::InputParse(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(
            self,
            LineageError::MissingConfig(_)
                | LineageError::ConfigRead(_)
                | LineageError::ConfigParse(_)
                | LineageError::InvalidSetting(_)
        )
    }

    /// Process exit status: 2 input or config, 3 connection, 4 write.
    pub fn exit_code(&self) -> u8 {
        match self {
            _ if self.is_input() || self.is_config() => 2,
            LineageError::Connection(_) => 3,
            LineageError::Write { .. } | LineageError::BulkRequest(_) => 4,
            _ => 1,
        }
    }
}
