//! Stage archetypes and the worker every stage runs on.
//!
//! A stage is an owned value that is consumed when invoked. Invoking a stage
//! creates a fresh rendezvous stream, starts exactly one worker thread that
//! drives data from the stage's input to the write end of that stream, and
//! returns the read end. Terminal stages ([`Sinker`], [`Output`]) instead block
//! until their input is drained.
//!
//! Errors returned from an invocation are construction errors. Once a worker
//! runs, failures are reported only through [`Feedback`].

use crate::codec::MeasureReader;
use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use std::any::Any;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

/// A raw byte stream. Dropping it closes the reading side.
pub type ByteStream = Box<dyn Read + Send>;

/// Originates raw bytes from the outside world
pub trait Source: Send {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<ByteStream>;
}

/// Turns raw bytes into measures
pub trait Encoder: Send {
    fn encode(self: Box<Self>, feedback: &Feedback, input: ByteStream) -> Result<MeasureReader>;
}

/// Transforms, drops or injects measures
pub trait Filter: Send {
    fn apply(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<MeasureReader>;
}

/// Turns measures back into raw bytes
pub trait Decoder: Send {
    fn decode(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<ByteStream>;
}

/// Consumes raw bytes to completion
pub trait Sinker: Send {
    fn sink(self: Box<Self>, feedback: &Feedback, input: ByteStream) -> Result<()>;
}

/// Produces a measure stream
pub trait Input: Send {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader>;
}

/// Consumes a measure stream to completion
pub trait Output: Send {
    fn drain(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<()>;
}

impl<F> Input for F
where
    F: FnOnce(&Feedback) -> Result<MeasureReader> + Send,
{
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader> {
        (*self)(feedback)
    }
}

impl<F> Filter for F
where
    F: FnOnce(&Feedback, MeasureReader) -> Result<MeasureReader> + Send,
{
    fn apply(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<MeasureReader> {
        (*self)(feedback, input)
    }
}

impl<F> Output for F
where
    F: FnOnce(&Feedback, MeasureReader) -> Result<()> + Send,
{
    fn drain(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<()> {
        (*self)(feedback, input)
    }
}

/// Start the single worker thread of a stage.
///
/// The worker is named after the stage `feedback` is labelled with.
/// Everything the body owns, including the write end of the stage's output,
/// is dropped when the body returns or unwinds, so downstream readers always
/// observe end-of-stream. A panic is reported through feedback.
pub(crate) fn spawn_worker<F>(feedback: &Feedback, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let feedback = feedback.clone();
    let stage = feedback.stage().to_string();
    thread::Builder::new()
        .name(format!("mstream-{stage}"))
        .spawn(move || {
            tracing::trace!(stage = %feedback.stage(), "worker started");
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                feedback.error(format!("worker panicked: {}", panic_message(&*payload)));
            }
            tracing::trace!(stage = %feedback.stage(), "worker exited");
        })
        .map_err(|e| PipelineError::ThreadError(format!("failed to spawn {stage} worker: {e}")))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::measure_pipe;
    use crate::feedback::{Collector, Severity};
    use crate::measure::Measure;

    #[test]
    fn test_worker_output_closed_after_panic() {
        let collector = Collector::new();
        let fb = collector.feedback().for_stage("exploding");
        let (mut writer, mut reader) = measure_pipe();

        let handle = spawn_worker(&fb, move || {
            writer.write(&Measure::new("before", 1)).unwrap();
            panic!("boom");
        })
        .unwrap();

        assert_eq!(reader.read().unwrap().name, "before");
        assert!(reader.read().unwrap_err().is_end_of_stream());
        handle.join().unwrap();

        let reports = collector.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, Severity::Error);
        assert_eq!(reports[0].stage, "exploding");
        assert!(reports[0].message.contains("boom"));
    }

    #[test]
    fn test_closure_stages() {
        let fb = Collector::new().feedback();
        let input: Box<dyn Input> = Box::new(|_fb: &Feedback| -> Result<MeasureReader> {
            let (mut w, r) = measure_pipe();
            thread::spawn(move || {
                w.write(&Measure::new("m", 7)).unwrap();
            });
            Ok(r)
        });
        let filter: Box<dyn Filter> =
            Box::new(|_fb: &Feedback, r: MeasureReader| -> Result<MeasureReader> { Ok(r) });
        let output: Box<dyn Output> = Box::new(|_fb: &Feedback, r: MeasureReader| -> Result<()> {
            let got: Vec<Measure> = r.map(|m| m.unwrap()).collect();
            assert_eq!(got, vec![Measure::new("m", 7)]);
            Ok(())
        });

        let reader = input.open(&fb).unwrap();
        let reader = filter.apply(&fb, reader).unwrap();
        output.drain(&fb, reader).unwrap();
    }
}
