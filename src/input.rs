//! Input composition.
//!
//! An [`Input`] is anything that yields a measure stream. Besides closures,
//! inputs are built from a producing function ([`ProducerInput`]), from a
//! source and an encoder ([`ComposedInput`]), by appending a filter to another
//! input ([`FilteredInput`]) or by merging several inputs ([`MergedInput`]).

use crate::codec::{measure_pipe, MeasureReader, MeasureWriter};
use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use crate::measure::Measure;
use crate::stage::{spawn_worker, Encoder, Filter, Input, Source};
use crossbeam::channel;

type ProduceFn = Box<dyn FnOnce(&Feedback, &mut MeasureWriter) + Send>;

/// Runs a measure-producing function on its own worker
pub struct ProducerInput {
    name: String,
    produce: ProduceFn,
}

impl ProducerInput {
    pub fn new<F>(produce: F) -> Self
    where
        F: FnOnce(&Feedback, &mut MeasureWriter) + Send + 'static,
    {
        Self {
            name: "producer".to_string(),
            produce: Box::new(produce),
        }
    }

    /// Emit a fixed list of measures in order
    pub fn from_measures(measures: Vec<Measure>) -> Self {
        Self::new(move |fb: &Feedback, out: &mut MeasureWriter| {
            for measure in &measures {
                out.write_or_report(measure, fb);
                if out.is_broken() {
                    break;
                }
            }
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Input for ProducerInput {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader> {
        let ProducerInput { name, produce } = *self;
        let feedback = feedback.for_stage(&name);
        let (mut writer, reader) = measure_pipe();
        let fb = feedback.clone();
        spawn_worker(&feedback, move || {
            produce(&fb, &mut writer);
            tracing::debug!(stage = %fb.stage(), "producer finished");
        })?;
        Ok(reader)
    }
}

/// A source whose bytes are turned into measures by an encoder
pub struct ComposedInput {
    source: Box<dyn Source>,
    encoder: Box<dyn Encoder>,
}

impl ComposedInput {
    pub fn new(source: Box<dyn Source>, encoder: Box<dyn Encoder>) -> Self {
        Self { source, encoder }
    }
}

impl Input for ComposedInput {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader> {
        let bytes = self.source.open(feedback)?;
        self.encoder.encode(feedback, bytes)
    }
}

/// An input whose measures pass through a filter
pub struct FilteredInput {
    input: Box<dyn Input>,
    filter: Box<dyn Filter>,
}

impl FilteredInput {
    pub fn new(input: Box<dyn Input>, filter: Box<dyn Filter>) -> Self {
        Self { input, filter }
    }
}

impl Input for FilteredInput {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader> {
        let reader = self.input.open(feedback)?;
        self.filter.apply(feedback, reader)
    }
}

/// Fan-in of several inputs into one measure stream.
///
/// Every input is opened when the merged input is opened, and each resulting
/// stream is drained by its own worker into a shared rendezvous channel. A
/// collector worker writes whatever arrives to the merged output and closes
/// it once every branch has ended. Records of one branch keep their order;
/// records of different branches interleave arbitrarily.
pub struct MergedInput {
    name: String,
    inputs: Vec<Box<dyn Input>>,
}

impl MergedInput {
    pub fn new(inputs: Vec<Box<dyn Input>>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(PipelineError::Config("merged input needs at least one input".into()));
        }
        Ok(Self {
            name: "merged-input".to_string(),
            inputs,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl Input for MergedInput {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<MeasureReader> {
        let MergedInput { name, inputs } = *self;
        let merged_fb = feedback.for_stage(&name);

        let mut readers = Vec::with_capacity(inputs.len());
        for input in inputs {
            readers.push(input.open(feedback)?);
        }

        let (tx, rx) = channel::bounded::<Measure>(0);
        for (i, mut reader) in readers.into_iter().enumerate() {
            let branch_fb = merged_fb.for_stage(&format!("{name}-{i}"));
            let fb = branch_fb.clone();
            let tx = tx.clone();
            spawn_worker(&branch_fb, move || loop {
                match reader.read() {
                    Ok(measure) => {
                        if tx.send(measure).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.is_end_of_stream() => break,
                    Err(err) if err.is_fatal() => {
                        fb.error(format!("error on read: {err}"));
                        break;
                    }
                    Err(err) => fb.error(format!("error on read: {err}")),
                }
            })?;
        }
        // The collector sees disconnection once the last branch drops its sender
        drop(tx);

        let (mut writer, reader) = measure_pipe();
        let fb = merged_fb.clone();
        spawn_worker(&merged_fb, move || {
            let mut forwarded = 0u64;
            for measure in rx.iter() {
                match writer.write(&measure) {
                    Ok(()) => forwarded += 1,
                    Err(err) => {
                        fb.error(format!("error on write: {err}"));
                        if err.is_fatal() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(stage = %fb.stage(), forwarded, "all merged inputs ended");
        })?;
        Ok(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncoderStage;
    use crate::feedback::Collector;
    use crate::filter::inject_name;
    use crate::source::SourceStage;
    use std::io::{BufRead, BufReader, Read};

    fn numbered(name: &str, count: i64) -> Box<dyn Input> {
        let measures = (0..count).map(|i| Measure::new(name, i)).collect();
        Box::new(ProducerInput::from_measures(measures).with_name(name))
    }

    #[test]
    fn test_producer_input_in_order() {
        let collector = Collector::new();
        let reader = numbered("p", 5).open(&collector.feedback()).unwrap();
        let times: Vec<i64> = reader.map(|m| m.unwrap().time).collect();
        assert_eq!(times, vec![0, 1, 2, 3, 4]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_composed_input() {
        let source = SourceStage::from_reader(std::io::Cursor::new(b"x\ny\n".to_vec()));
        let encoder = EncoderStage::new(
            |fb: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter| {
                for (i, line) in BufReader::new(input).lines().enumerate() {
                    match line {
                        Ok(line) => out.write_or_report(&Measure::new(line, i as i64), fb),
                        Err(err) => fb.error(err.to_string()),
                    }
                }
            },
        );
        let input = Box::new(ComposedInput::new(Box::new(source), Box::new(encoder)));
        let names: Vec<String> = input
            .open(&Collector::new().feedback())
            .unwrap()
            .map(|m| m.unwrap().name)
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_filtered_input() {
        let input = Box::new(FilteredInput::new(numbered("raw", 3), Box::new(inject_name("renamed"))));
        let reader = input.open(&Collector::new().feedback()).unwrap();
        assert!(reader.map(|m| m.unwrap()).all(|m| m.name == "renamed"));
    }

    #[test]
    fn test_merged_input_rejects_empty() {
        assert!(matches!(MergedInput::new(Vec::new()), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_merged_input_sums_branches() {
        let collector = Collector::new();
        let merged = Box::new(
            MergedInput::new(vec![numbered("a", 10), numbered("b", 7), numbered("c", 0)]).unwrap(),
        );
        let measures: Vec<Measure> = merged
            .open(&collector.feedback())
            .unwrap()
            .map(|m| m.unwrap())
            .collect();
        assert_eq!(measures.len(), 17);

        // Per-branch order survives the merge
        let a: Vec<i64> = measures.iter().filter(|m| m.name == "a").map(|m| m.time).collect();
        assert_eq!(a, (0..10).collect::<Vec<_>>());
        let b: Vec<i64> = measures.iter().filter(|m| m.name == "b").map(|m| m.time).collect();
        assert_eq!(b, (0..7).collect::<Vec<_>>());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_merged_input_open_error_returned() {
        let failing: Box<dyn Input> = Box::new(|_fb: &Feedback| -> Result<MeasureReader> {
            Err(PipelineError::Config("no endpoint".into()))
        });
        let merged = Box::new(MergedInput::new(vec![numbered("a", 3), failing]).unwrap());
        let err = merged.open(&Collector::new().feedback()).unwrap_err();
        assert!(err.to_string().contains("no endpoint"));
    }

    #[test]
    fn test_merged_input_skips_undecodable_records() {
        let collector = Collector::new();
        let garbage: Box<dyn Input> = Box::new(|_fb: &Feedback| -> Result<MeasureReader> {
            // A lone CBOR break byte is never a valid record
            Ok(MeasureReader::new(std::io::Cursor::new(vec![0xff])))
        });
        let merged = Box::new(
            MergedInput::new(vec![numbered("a", 4), garbage])
                .unwrap()
                .with_name("fan-in"),
        );
        let measures: Vec<Measure> = merged
            .open(&collector.feedback())
            .unwrap()
            .map(|m| m.unwrap())
            .collect();
        assert_eq!(measures.len(), 4);
        assert!(measures.iter().all(|m| m.name == "a"));

        let reports = collector.reports();
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|r| r.stage == "fan-in-1"));
    }
}
