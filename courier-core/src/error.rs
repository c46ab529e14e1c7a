pub type Result<T> = std::result::Result<T, Error>;

/// Run-level errors. Anything here aborts the run and is handed to the
/// caller as the error half of the terminal report; item-level failures
/// never surface through this type, they land in the summary's failure
/// list instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Occurs when a `folder` selector matches nothing and the bail policy
    /// requires the lookup to succeed.
    #[error("Unable to find a folder or request: {0}")]
    NotFound(String),
    /// Occurs when the global run timeout fires before the run completes.
    #[error("callback timed out")]
    Timeout,
    /// Occurs when the bail policy escalates an item failure into a
    /// run-level abort (the `folder` modifier).
    #[error("{0}")]
    Bailed(String),
    /// Occurs when subscribing after the run already closed its event
    /// channel.
    #[error("run event channel has been already closed")]
    ChannelClosed,
}

impl Error {
    /// Stable machine-readable name of the error kind, used in the
    /// serialized summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Timeout => "timeout",
            Error::Bailed(_) => "bailed",
            Error::ChannelClosed => "channel_closed",
        }
    }
}
