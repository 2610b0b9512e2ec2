use crate::error::Result;
use crate::feedback::Feedback;
use crate::stage::{ByteStream, Sinker};
use std::io::{self, Read, Write};

/// Pushes raw bytes to their destination
pub trait Drain: Send + 'static {
    fn drain(&mut self, feedback: &Feedback, input: &mut dyn Read) -> Result<()>;
}

impl<F> Drain for F
where
    F: FnMut(&Feedback, &mut dyn Read) -> Result<()> + Send + 'static,
{
    fn drain(&mut self, feedback: &Feedback, input: &mut dyn Read) -> Result<()> {
        self(feedback, input)
    }
}

/// A sinker driven by a [`Drain`] adapter on the calling thread.
///
/// Whatever the adapter leaves unread is discarded before `sink` returns, so
/// upstream workers always run to completion.
pub struct SinkerStage {
    name: String,
    adapter: Box<dyn Drain>,
}

impl SinkerStage {
    pub fn new(adapter: impl Drain) -> Self {
        Self {
            name: "sinker".to_string(),
            adapter: Box::new(adapter),
        }
    }

    /// Copy the stream into `out` and flush it
    pub fn to_writer<W>(out: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::new(WriterDrain { out }).with_name("writer")
    }

    pub fn stdout() -> Self {
        Self::to_writer(io::stdout()).with_name("stdout")
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Sinker for SinkerStage {
    fn sink(self: Box<Self>, feedback: &Feedback, mut input: ByteStream) -> Result<()> {
        let SinkerStage { name, mut adapter } = *self;
        let feedback = feedback.for_stage(&name);
        adapter.drain(&feedback, &mut input)?;
        let rest = io::copy(&mut input, &mut io::sink())?;
        if rest > 0 {
            tracing::debug!(stage = %name, bytes = rest, "discarded unread input");
        }
        Ok(())
    }
}

struct WriterDrain<W> {
    out: W,
}

impl<W> Drain for WriterDrain<W>
where
    W: Write + Send + 'static,
{
    fn drain(&mut self, _feedback: &Feedback, input: &mut dyn Read) -> Result<()> {
        io::copy(input, &mut self.out)?;
        self.out.flush()?;
        Ok(())
    }
}
