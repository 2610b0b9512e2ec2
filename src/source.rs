use crate::error::Result;
use crate::feedback::Feedback;
use crate::pipe;
use crate::stage::{spawn_worker, ByteStream, Source};
use std::io::{self, Read, Write};

/// Writes raw bytes into a source's output stream
pub trait Produce: Send + 'static {
    fn produce(&mut self, feedback: &Feedback, out: &mut dyn Write);
}

impl<F> Produce for F
where
    F: FnMut(&Feedback, &mut dyn Write) + Send + 'static,
{
    fn produce(&mut self, feedback: &Feedback, out: &mut dyn Write) {
        self(feedback, out)
    }
}

/// A source driven by a [`Produce`] adapter on its own worker
pub struct SourceStage {
    name: String,
    adapter: Box<dyn Produce>,
}

impl SourceStage {
    pub fn new(adapter: impl Produce) -> Self {
        Self {
            name: "source".to_string(),
            adapter: Box::new(adapter),
        }
    }

    /// Open a reader lazily on the worker and copy it into the stream.
    /// Failing to open is reported through feedback.
    pub fn from_getter<G, R>(get: G) -> Self
    where
        G: FnOnce() -> io::Result<R> + Send + 'static,
        R: Read,
    {
        Self::new(Getter { get: Some(get) })
    }

    /// Copy an already open reader into the stream
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::from_getter(move || Ok(reader))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Source for SourceStage {
    fn open(self: Box<Self>, feedback: &Feedback) -> Result<ByteStream> {
        let SourceStage { name, mut adapter } = *self;
        let feedback = feedback.for_stage(&name);
        let (mut writer, reader) = pipe::pipe();
        let fb = feedback.clone();
        spawn_worker(&feedback, move || {
            adapter.produce(&fb, &mut writer);
            tracing::debug!(stage = %fb.stage(), "source exhausted");
        })?;
        Ok(Box::new(reader))
    }
}

struct Getter<G> {
    get: Option<G>,
}

impl<G, R> Produce for Getter<G>
where
    G: FnOnce() -> io::Result<R> + Send + 'static,
    R: Read,
{
    fn produce(&mut self, feedback: &Feedback, out: &mut dyn Write) {
        let Some(get) = self.get.take() else {
            return;
        };
        match get() {
            Ok(mut reader) => {
                if let Err(err) = io::copy(&mut reader, out) {
                    feedback.error(format!("error on writing: {err}"));
                }
            }
            Err(err) => feedback.error(format!("error on retrieving reader: {err}")),
        }
    }
}
