//! Composable thread-per-stage streaming pipelines for typed metric records.
//!
//! A pipeline moves [`Measure`] records from an input, through filters, to an
//! output. Every stage runs on its own worker thread and hands data to the
//! next stage over an unbuffered rendezvous stream, so a slow stage holds back
//! everything upstream of it and no record is ever queued.
//!
//! # Features
//!
//! - Rendezvous byte streams with distinguishable end-of-stream
//! - Self-delimiting CBOR framing for measures between stages
//! - Source, Encoder, Filter, Decoder and Sinker stages driven by closures or adapters
//! - Fan-in and fan-out of whole inputs and outputs
//! - Runtime failures reported through a typed feedback channel, never by aborting
//! - Per-filter throughput and latency percentiles
//!
//! # Example
//!
//! ```no_run
//! use measure_stream::{
//!     count_measures, DecoderStage, Feedback, Measure, Pipeline, ProducerInput, SinkerStage,
//! };
//!
//! let pipeline = Pipeline::builder()
//!     .input(ProducerInput::from_measures(vec![
//!         Measure::new("cpu", 1).with_tag("host", "a"),
//!         Measure::new("mem", 2).with_tag("host", "a"),
//!     ]))
//!     .filter(count_measures())
//!     .decoder(DecoderStage::json_lines())
//!     .sinker(SinkerStage::stdout())
//!     .build()?;
//!
//! pipeline.run(&Feedback::tracing())?;
//! # Ok::<(), measure_stream::PipelineError>(())
//! ```

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod input;
pub mod measure;
pub mod metrics;
pub mod output;
pub mod pipe;
pub mod pipeline;
pub mod sinker;
pub mod source;
pub mod stage;

// Re-exports for convenience
pub use codec::{measure_pipe, MeasureReader, MeasureWriter};
pub use decoder::{Decode, DecoderStage, MeasureDecoder};
pub use encoder::{Encode, EncoderStage, JsonEncoder};
pub use error::{FieldError, PipelineError, Result, StreamError};
pub use feedback::{Collector, Feedback, FeedbackSink, Report, Severity, TracingSink};
pub use filter::{
    count_measures, inject_fields, inject_name, inject_tags, inject_time, log_measures,
    passthrough, sanitize_name, ChainFilter, FilterStage, MeasureCounter, Transform,
};
pub use input::{ComposedInput, FilteredInput, MergedInput, ProducerInput};
pub use measure::{Field, FieldType, FieldValue, Measure, Tag};
pub use metrics::{LatencySummary, LatencyWindow, MetricsSnapshot, StageMetrics};
pub use output::{ComposedOutput, FilteredOutput, MergedOutput};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use sinker::{Drain, SinkerStage};
pub use source::{Produce, SourceStage};
pub use stage::{ByteStream, Decoder, Encoder, Filter, Input, Output, Sinker, Source};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
