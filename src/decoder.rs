use crate::codec::MeasureReader;
use crate::error::Result;
use crate::feedback::Feedback;
use crate::measure::Measure;
use crate::pipe;
use crate::stage::{spawn_worker, ByteStream, Decoder};
use std::io::{self, BufWriter, Write};

/// Reads measures and writes their byte representation
pub trait Decode: Send + 'static {
    fn decode(&mut self, feedback: &Feedback, input: &mut MeasureReader, out: &mut dyn Write);
}

impl<F> Decode for F
where
    F: FnMut(&Feedback, &mut MeasureReader, &mut dyn Write) + Send + 'static,
{
    fn decode(&mut self, feedback: &Feedback, input: &mut MeasureReader, out: &mut dyn Write) {
        self(feedback, input, out)
    }
}

/// A decoder driven by a [`Decode`] adapter on its own worker
pub struct DecoderStage {
    name: String,
    adapter: Box<dyn Decode>,
}

impl DecoderStage {
    pub fn new(adapter: impl Decode) -> Self {
        Self {
            name: "decoder".to_string(),
            adapter: Box::new(adapter),
        }
    }

    /// Renders each measure as one line of JSON
    pub fn json_lines() -> Self {
        Self::new(MeasureDecoder::new(|m: &Measure, w: &mut dyn Write| {
            serde_json::to_writer(&mut *w, m)?;
            w.write_all(b"\n")
        }))
        .with_name("json-lines")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Decoder for DecoderStage {
    fn decode(self: Box<Self>, feedback: &Feedback, mut input: MeasureReader) -> Result<ByteStream> {
        let DecoderStage { name, mut adapter } = *self;
        let feedback = feedback.for_stage(&name);
        let (writer, reader) = pipe::pipe();
        let fb = feedback.clone();
        spawn_worker(&feedback, move || {
            let mut out = BufWriter::new(writer);
            adapter.decode(&fb, &mut input, &mut out);
            if let Err(err) = out.flush() {
                fb.error(format!("error flushing output: {err}"));
            }
        })?;
        Ok(Box::new(reader))
    }
}

/// Applies a per-measure rendering function to every record of the input.
///
/// Read and render failures are reported and the next record is handled.
pub struct MeasureDecoder<F> {
    render: F,
}

impl<F> MeasureDecoder<F>
where
    F: FnMut(&Measure, &mut dyn Write) -> io::Result<()> + Send + 'static,
{
    pub fn new(render: F) -> Self {
        Self { render }
    }
}

impl<F> Decode for MeasureDecoder<F>
where
    F: FnMut(&Measure, &mut dyn Write) -> io::Result<()> + Send + 'static,
{
    fn decode(&mut self, feedback: &Feedback, input: &mut MeasureReader, out: &mut dyn Write) {
        loop {
            let measure = match input.read() {
                Ok(measure) => measure,
                Err(err) if err.is_end_of_stream() => break,
                Err(err) if err.is_fatal() => {
                    feedback.error(format!("read error: {err}"));
                    break;
                }
                Err(err) => {
                    feedback.error(format!("read error: {err}"));
                    continue;
                }
            };
            let rendered = (self.render)(&measure, out).and_then(|_| out.flush());
            if let Err(err) = rendered {
                feedback.error(format!("decode error: {err}"));
                if err.kind() == io::ErrorKind::BrokenPipe {
                    break;
                }
            }
        }
    }
}
