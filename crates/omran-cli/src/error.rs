use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] omran_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No user selected. Pass --user or set OMRAN_USER_ID.")]
    MissingUser,
    #[error("No payload provided. Pass JSON as an argument or pipe it on stdin.")]
    EmptyPayload,
    #[error(
        "Remote store is not configured. Set remote.url and remote.anon_key in the config file, or OMRAN_REMOTE_URL and OMRAN_ANON_KEY."
    )]
    RemoteNotConfigured,
}
