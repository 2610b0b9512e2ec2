//! Output composition.
//!
//! An [`Output`] consumes a measure stream to completion. Besides closures,
//! outputs are built from a decoder and a sinker ([`ComposedOutput`]), by
//! putting a filter in front of another output ([`FilteredOutput`]) or by
//! duplicating a stream into several outputs ([`MergedOutput`]).

use crate::codec::{measure_pipe, MeasureReader, MeasureWriter};
use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use crate::stage::{panic_message, spawn_worker, Decoder, Filter, Output, Sinker};

/// A decoder whose bytes are consumed by a sinker
pub struct ComposedOutput {
    decoder: Box<dyn Decoder>,
    sinker: Box<dyn Sinker>,
}

impl ComposedOutput {
    pub fn new(decoder: Box<dyn Decoder>, sinker: Box<dyn Sinker>) -> Self {
        Self { decoder, sinker }
    }
}

impl Output for ComposedOutput {
    fn drain(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<()> {
        let bytes = self.decoder.decode(feedback, input)?;
        self.sinker.sink(feedback, bytes)
    }
}

/// An output fed through a filter
pub struct FilteredOutput {
    filter: Box<dyn Filter>,
    output: Box<dyn Output>,
}

impl FilteredOutput {
    pub fn new(filter: Box<dyn Filter>, output: Box<dyn Output>) -> Self {
        Self { filter, output }
    }
}

impl Output for FilteredOutput {
    fn drain(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<()> {
        let filtered = self.filter.apply(feedback, input)?;
        self.output.drain(feedback, filtered)
    }
}

struct Branch {
    feedback: Feedback,
    writer: Option<MeasureWriter>,
}

/// Fan-out of one measure stream into several outputs.
///
/// Each output drains its own stream on its own worker. Every record read
/// from upstream is written to every branch still accepting records. A
/// branch that fails is reported and dropped; the others keep receiving.
/// `drain` returns once upstream has ended and every branch has finished.
pub struct MergedOutput {
    name: String,
    outputs: Vec<Box<dyn Output>>,
}

impl MergedOutput {
    pub fn new(outputs: Vec<Box<dyn Output>>) -> Result<Self> {
        if outputs.is_empty() {
            return Err(PipelineError::Config("merged output needs at least one output".into()));
        }
        Ok(Self {
            name: "merged-output".to_string(),
            outputs,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl Output for MergedOutput {
    fn drain(self: Box<Self>, feedback: &Feedback, mut input: MeasureReader) -> Result<()> {
        let MergedOutput { name, outputs } = *self;
        let merged_fb = feedback.for_stage(&name);

        let mut branches = Vec::with_capacity(outputs.len());
        let mut handles = Vec::with_capacity(outputs.len());
        for (i, output) in outputs.into_iter().enumerate() {
            let (writer, reader) = measure_pipe();
            let branch_fb = merged_fb.for_stage(&format!("{name}-{i}"));
            let fb = branch_fb.clone();
            let output_fb = feedback.clone();
            handles.push(spawn_worker(&branch_fb, move || {
                if let Err(err) = output.drain(&output_fb, reader) {
                    fb.error(format!("output failed: {err}"));
                }
            })?);
            branches.push(Branch {
                feedback: branch_fb,
                writer: Some(writer),
            });
        }

        loop {
            let measure = match input.read() {
                Ok(measure) => measure,
                Err(err) if err.is_end_of_stream() => break,
                Err(err) if err.is_fatal() => {
                    merged_fb.error(format!("error on read: {err}"));
                    break;
                }
                Err(err) => {
                    merged_fb.error(format!("error on read: {err}"));
                    continue;
                }
            };

            for branch in branches.iter_mut() {
                let Some(writer) = branch.writer.as_mut() else {
                    continue;
                };
                if let Err(err) = writer.write(&measure) {
                    if err.is_fatal() {
                        branch.feedback.error(format!("branch stopped accepting records: {err}"));
                        branch.writer = None;
                    } else {
                        branch.feedback.error(format!("error on write: {err}"));
                    }
                }
            }
            if branches.iter().all(|b| b.writer.is_none()) {
                merged_fb.warn("every branch has stopped, abandoning input");
                break;
            }
        }

        // Closing every branch lets its output reach end-of-stream
        drop(branches);
        for handle in handles {
            if let Err(payload) = handle.join() {
                merged_fb.error(format!("branch worker panicked: {}", panic_message(&*payload)));
            }
        }
        tracing::debug!(stage = %merged_fb.stage(), "all merged outputs finished");
        Ok(())
    }
}
