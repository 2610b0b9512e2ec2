use crate::measure::FieldType;
use std::io;
use thiserror::Error;

/// Result type for measure pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors returned synchronously by stage construction and invocation
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required stage was never configured
    #[error("Pipeline has no {0} stage")]
    MissingStage(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stage execution error
    #[error("Stage execution failed: {0}")]
    Stage(String),

    /// Worker thread could not be spawned or joined
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// Data path failure surfaced to the caller
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Conditions observed on a stream while records flow through it
#[derive(Error, Debug)]
pub enum StreamError {
    /// The writer closed the stream and every record has been read
    #[error("end of stream")]
    EndOfStream,

    /// Write attempted after the writer closed its own end
    #[error("write on closed stream")]
    Closed,

    /// The reading end is gone
    #[error("broken pipe: reader dropped")]
    BrokenPipe,

    #[error("failed to encode measure: {0}")]
    Encode(String),

    #[error("failed to decode measure: {0}")]
    Decode(String),

    #[error("stream IO error: {0}")]
    Io(io::Error),
}

impl StreamError {
    /// True when no further record can flow on the stream that produced this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Closed | StreamError::BrokenPipe | StreamError::Io(_)
        )
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, StreamError::EndOfStream)
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe => StreamError::BrokenPipe,
            io::ErrorKind::UnexpectedEof => StreamError::Decode("truncated record".into()),
            _ => StreamError::Io(err),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(err) => err,
            StreamError::BrokenPipe | StreamError::Closed => {
                io::Error::new(io::ErrorKind::BrokenPipe, err)
            }
            StreamError::EndOfStream => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Errors comparing two fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("cannot compare fields of different types: {left} and {right}")]
    TypeMismatch { left: FieldType, right: FieldType },

    #[error("cannot compare nil values")]
    NilComparison,
}
