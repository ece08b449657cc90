use std::process::{ExitCode, Termination};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Encounter IO error, {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[cfg(feature = "serde")]
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Error: {0}")]
    Custom(String),
}

// sysexits(3) codes, so scripts driving the simulator can tell failures apart
impl Termination for Error {
    fn report(self) -> ExitCode {
        match self {
            Error::IoError(_) => ExitCode::from(74),
            Error::ConfigError(_) => ExitCode::from(78),
            #[cfg(feature = "serde")]
            Error::SerdeError(_) => ExitCode::from(65),
            Error::Custom(_) => ExitCode::from(1),
        }
    }
}
