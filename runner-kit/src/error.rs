use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} failed with HTTP status {status}")]
    DownloadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to extract runner archive: {0}")]
    Extract(String),

    #[error("Runner configuration failed: {0}")]
    Configure(String),

    #[error("Runner exited with failure: {0}")]
    Run(String),

    #[error("Unknown runner platform: {0}")]
    UnknownPlatform(String),

    #[error("Unknown runner architecture: {0}")]
    UnknownArch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn read_archive(path: &std::path::Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    #[test]
    fn test_io_error_converts_through_result_alias() {
        let err = read_archive(std::path::Path::new("/nonexistent/runner.tar.gz")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error:"));
    }
}
