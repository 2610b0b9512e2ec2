//! Typed record boundary over byte streams.
//!
//! Each measure is written as one self-delimiting CBOR item, so a reader can
//! always tell where one record ends and the next begins. A clean end of the
//! underlying stream between records is reported as
//! [`StreamError::EndOfStream`]; a stream ending in the middle of a record, or
//! bytes that do not decode, are reported as [`StreamError::Decode`].

use crate::error::StreamError;
use crate::feedback::Feedback;
use crate::measure::Measure;
use crate::pipe;
use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use std::io::{BufRead, BufReader, Read, Write};

/// Create a rendezvous stream wrapped in the measure codec
pub fn measure_pipe() -> (MeasureWriter, MeasureReader) {
    let (writer, reader) = pipe::pipe();
    (MeasureWriter::new(writer), MeasureReader::new(reader))
}

/// Serializes measures onto a byte stream
pub struct MeasureWriter {
    inner: Box<dyn Write + Send>,
    scratch: Vec<u8>,
    broken: bool,
}

impl MeasureWriter {
    pub fn new(inner: impl Write + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            scratch: Vec::with_capacity(256),
            broken: false,
        }
    }

    /// Write one complete record
    pub fn write(&mut self, measure: &Measure) -> Result<(), StreamError> {
        self.scratch.clear();
        ciborium::ser::into_writer(measure, &mut self.scratch).map_err(|err| match err {
            SerializeError::Io(err) => StreamError::Io(err),
            SerializeError::Value(msg) => StreamError::Encode(msg),
        })?;

        // One write per record keeps each record in a single hand-off
        let result = self
            .inner
            .write_all(&self.scratch)
            .and_then(|_| self.inner.flush())
            .map_err(StreamError::from);
        if let Err(err) = &result {
            if err.is_fatal() {
                self.broken = true;
            }
        }
        result
    }

    /// Write one record, reporting a failure through feedback instead of returning it
    pub fn write_or_report(&mut self, measure: &Measure, feedback: &Feedback) {
        if let Err(err) = self.write(measure) {
            feedback.error(format!("write failed: {err}"));
        }
    }

    /// True once a write failed in a way no later write can recover from
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Deserializes measures from a byte stream
pub struct MeasureReader {
    inner: BufReader<Box<dyn Read + Send>>,
}

impl std::fmt::Debug for MeasureReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasureReader").finish_non_exhaustive()
    }
}

impl MeasureReader {
    pub fn new(inner: impl Read + Send + 'static) -> Self {
        let inner: Box<dyn Read + Send> = Box::new(inner);
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Block until the next record is available
    pub fn read(&mut self) -> Result<Measure, StreamError> {
        if self.inner.fill_buf().map_err(StreamError::from)?.is_empty() {
            return Err(StreamError::EndOfStream);
        }
        ciborium::de::from_reader(&mut self.inner).map_err(|err| match err {
            DeserializeError::Io(err) => StreamError::from(err),
            DeserializeError::Syntax(offset) => {
                StreamError::Decode(format!("syntax error at byte {offset}"))
            }
            DeserializeError::Semantic(_, msg) => StreamError::Decode(msg),
            DeserializeError::RecursionLimitExceeded => {
                StreamError::Decode("recursion limit exceeded".into())
            }
        })
    }
}

impl Iterator for MeasureReader {
    type Item = Result<Measure, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Err(StreamError::EndOfStream) => None,
            other => Some(other),
        }
    }
}
