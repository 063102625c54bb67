//! Error types and result definitions for driver operations.
//!
//! Every failure surfaced by the driver is a [`DriverError`] carrying a classified [`ErrorKind`]
//! with a stable numeric code, a static description, optional dynamic detail, the originating
//! error and the callsite location. Cleanup failures never replace a primary error; they are
//! attached to it with [`DriverError::with_suppressed`].

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used across the driver.
pub type DriverResult<T> = Result<T, DriverError>;

/// Payload stored for every [`DriverError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    suppressed: Vec<DriverError>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the driver.
#[derive(Debug, Clone)]
pub struct DriverError {
    payload: Box<ErrorPayload>,
}

/// Categories of failures, grouped by who has to act on them.
///
/// The numeric [`ErrorKind::code`] of a kind never changes; callers map it into their own
/// response envelopes.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Caller supplied data that cannot be turned into a query.
    QueryBuilder,
    ColumnNotFound,
    ColumnsMismatch,
    UnsupportedType,
    InvalidIdentifier,
    InvalidArgument,

    // Data and catalog state discovered while moving rows.
    ImportValidation,
    ObjectAlreadyExists,
    ObjectNotFound,

    // Remote engine failures.
    TooManyRequests,
    DestinationQueryFailed,
    DestinationIoError,
    AuthenticationError,

    // Local failures.
    ConversionError,
    SerializationError,
    ConfigError,
    InvalidState,

    Unknown,
}

impl ErrorKind {
    /// Returns the stable numeric code of this kind.
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::QueryBuilder => 1001,
            ErrorKind::ColumnNotFound => 1002,
            ErrorKind::ColumnsMismatch => 1003,
            ErrorKind::UnsupportedType => 1004,
            ErrorKind::ImportValidation => 1005,
            ErrorKind::ObjectAlreadyExists => 1006,
            ErrorKind::ObjectNotFound => 1007,
            ErrorKind::InvalidIdentifier => 1008,
            ErrorKind::InvalidArgument => 1009,
            ErrorKind::TooManyRequests => 1429,
            ErrorKind::DestinationQueryFailed => 2001,
            ErrorKind::DestinationIoError => 2002,
            ErrorKind::AuthenticationError => 2003,
            ErrorKind::ConversionError => 2004,
            ErrorKind::SerializationError => 2005,
            ErrorKind::ConfigError => 2006,
            ErrorKind::InvalidState => 2007,
            ErrorKind::Unknown => 9999,
        }
    }

    /// Returns `true` if an operation failing with this kind may be retried as-is.
    ///
    /// Only remote throttling qualifies. Retrying is the execution client's job, the import
    /// engine never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TooManyRequests)
    }
}

impl DriverError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the stable numeric code of this error.
    pub fn code(&self) -> u16 {
        self.payload.kind.code()
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the dynamic detail, if any.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the errors that happened while cleaning up after this one.
    pub fn suppressed(&self) -> &[DriverError] {
        &self.payload.suppressed
    }

    /// Returns the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the callsite where the error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches the originating error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Attaches a secondary failure, typically from cleanup, without changing the primary kind.
    pub fn with_suppressed(mut self, error: DriverError) -> Self {
        self.payload.suppressed.push(error);
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        DriverError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                suppressed: Vec::new(),
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for DriverError {
    fn eq(&self, other: &DriverError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}:{}] {} @ {}:{}:{}",
            payload.kind,
            payload.kind.code(),
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            write_block(f, "Detail", detail)?;
        }

        if !payload.suppressed.is_empty() {
            write!(f, "\n  Suppressed:")?;
            for (index, error) in payload.suppressed.iter().enumerate() {
                let rendered = error.to_string();
                let mut lines = rendered.lines();
                if let Some(first_line) = lines.next() {
                    write!(f, "\n    {}. {first_line}", index + 1)?;
                }
                for line in lines {
                    write!(f, "\n       {line}")?;
                }
            }
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write_block(f, "Backtrace", &backtrace)?;
        }

        Ok(())
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    if body.trim().is_empty() {
        return write!(f, "\n  {title}: <empty>");
    }

    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for DriverError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

/// Creates a [`DriverError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for DriverError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> DriverError {
        DriverError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`DriverError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for DriverError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> DriverError {
        DriverError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`serde_json::Error`] into [`ErrorKind::SerializationError`].
impl From<serde_json::Error> for DriverError {
    #[track_caller]
    fn from(err: serde_json::Error) -> DriverError {
        let detail = err.to_string();
        DriverError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed("JSON conversion failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`std::num::ParseIntError`] into [`ErrorKind::ConversionError`].
impl From<std::num::ParseIntError> for DriverError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> DriverError {
        let detail = err.to_string();
        DriverError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts configuration validation failures into [`ErrorKind::ConfigError`].
impl From<driver_config::shared::ValidationError> for DriverError {
    #[track_caller]
    fn from(err: driver_config::shared::ValidationError) -> DriverError {
        let detail = err.to_string();
        DriverError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid driver configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
