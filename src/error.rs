use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a run before any output is produced.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to open feed {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {feed} feed at record {record}: {source}")]
    Read {
        feed: &'static str,
        record: usize,
        #[source]
        source: csv::Error,
    },
}
