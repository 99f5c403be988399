use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The transport could not be instantiated (bad address, unsupported scheme, refused by the
    /// connector). Returned to the caller and followed by a reconnect attempt.
    TransportCreation,
    /// Runtime failure reported by a transport after it was created
    Transport,
    /// A payload was sent while no transport was open
    TransportUnavailable,
    /// Error related to invalid configuration
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    pub fn transport_creation<E: Into<String>, S: Into<String>>(endpoint: E, reason: S) -> Self {
        TransportCreation {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
        .into()
    }

    #[must_use]
    pub fn unavailable() -> Self {
        TransportUnavailable.into()
    }

    /// Whether this error came from a transport that could not be created.
    #[must_use]
    pub fn is_creation_failure(&self) -> bool {
        self.kind == Kind::TransportCreation
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

/// The connector refused to build a transport for `endpoint`.
#[non_exhaustive]
#[derive(Debug)]
pub struct TransportCreation {
    pub endpoint: String,
    pub reason: String,
}

impl fmt::Display for TransportCreation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to create transport for {}: {}",
            self.endpoint, self.reason
        )
    }
}

impl StdError for TransportCreation {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct TransportUnavailable;

impl fmt::Display for TransportUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no open transport is available to send on")
    }
}

impl StdError for TransportUnavailable {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<TransportCreation> for Error {
    fn from(err: TransportCreation) -> Self {
        Error::with_source(Kind::TransportCreation, err)
    }
}

impl From<TransportUnavailable> for Error {
    fn from(err: TransportUnavailable) -> Self {
        Error::with_source(Kind::TransportUnavailable, err)
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(Kind::Transport, e)
    }
}

#[cfg(feature = "websocket")]
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::TransportCreation, e)
    }
}
