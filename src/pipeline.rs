use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use crate::filter::ChainFilter;
use crate::input::ComposedInput;
use crate::output::ComposedOutput;
use crate::stage::{Decoder, Encoder, Filter, Input, Output, Sinker, Source};
use std::time::Instant;

/// Builder for constructing pipelines
pub struct PipelineBuilder {
    name: String,
    input: Option<Box<dyn Input>>,
    source: Option<Box<dyn Source>>,
    encoder: Option<Box<dyn Encoder>>,
    filters: Vec<Box<dyn Filter>>,
    output: Option<Box<dyn Output>>,
    decoder: Option<Box<dyn Decoder>>,
    sinker: Option<Box<dyn Sinker>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            name: "pipeline".to_string(),
            input: None,
            source: None,
            encoder: None,
            filters: Vec::new(),
            output: None,
            decoder: None,
            sinker: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the input stage. Excludes `source` and `encoder`.
    pub fn input(mut self, input: impl Input + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Set the source of a composed input
    pub fn source(mut self, source: impl Source + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set the encoder of a composed input
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoder = Some(Box::new(encoder));
        self
    }

    /// Append a filter. Filters run in the order they were added.
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Set the output stage. Excludes `decoder` and `sinker`.
    pub fn output(mut self, output: impl Output + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Set the decoder of a composed output
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    /// Set the sinker of a composed output
    pub fn sinker(mut self, sinker: impl Sinker + 'static) -> Self {
        self.sinker = Some(Box::new(sinker));
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<Pipeline> {
        let input: Box<dyn Input> = match (self.input, self.source, self.encoder) {
            (Some(input), None, None) => input,
            (None, Some(source), Some(encoder)) => Box::new(ComposedInput::new(source, encoder)),
            (None, None, None) => return Err(PipelineError::MissingStage("input")),
            (None, Some(_), None) => return Err(PipelineError::MissingStage("encoder")),
            (None, None, Some(_)) => return Err(PipelineError::MissingStage("source")),
            (Some(_), _, _) => {
                return Err(PipelineError::Config(
                    "input cannot be combined with source or encoder".into(),
                ))
            }
        };

        let mut filters = self.filters;
        let filter: Box<dyn Filter> = match filters.len() {
            0 => return Err(PipelineError::MissingStage("filter")),
            1 => filters.remove(0),
            _ => Box::new(ChainFilter::new(filters)),
        };

        let output: Box<dyn Output> = match (self.output, self.decoder, self.sinker) {
            (Some(output), None, None) => output,
            (None, Some(decoder), Some(sinker)) => Box::new(ComposedOutput::new(decoder, sinker)),
            (None, None, None) => return Err(PipelineError::MissingStage("output")),
            (None, Some(_), None) => return Err(PipelineError::MissingStage("sinker")),
            (None, None, Some(_)) => return Err(PipelineError::MissingStage("decoder")),
            (Some(_), _, _) => {
                return Err(PipelineError::Config(
                    "output cannot be combined with decoder or sinker".into(),
                ))
            }
        };

        Ok(Pipeline::new(input, filter, output).with_name(self.name))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An input, a filter and an output, run as one unit
pub struct Pipeline {
    name: String,
    input: Box<dyn Input>,
    filter: Box<dyn Filter>,
    output: Box<dyn Output>,
}

impl Pipeline {
    pub fn new(input: Box<dyn Input>, filter: Box<dyn Filter>, output: Box<dyn Output>) -> Self {
        Self {
            name: "pipeline".to_string(),
            input,
            filter,
            output,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the pipeline to completion.
    ///
    /// Opening the input and applying the filter start their workers; the
    /// output then runs on the calling thread until everything is drained.
    /// The first construction error stops assembly and is returned. Anything
    /// failing after that is reported through `feedback`.
    pub fn run(self, feedback: &Feedback) -> Result<()> {
        let Pipeline {
            name,
            input,
            filter,
            output,
        } = self;
        let started = Instant::now();
        tracing::debug!(pipeline = %name, "starting pipeline");

        let measures = input.open(feedback)?;
        let filtered = filter.apply(feedback, measures)?;
        let result = output.drain(feedback, filtered);

        tracing::debug!(
            pipeline = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "pipeline finished"
        );
        result
    }
}
