//! Fan-in and fan-out of measure streams
//!
//! Two simulated hosts are merged into one stream, stamped with a common
//! time, then duplicated: one branch prints JSON lines, the other counts
//! measures per name and prints a summary through feedback.
//!
//! Usage: RUST_LOG=info cargo run --example fan_out

use measure_stream::{
    count_measures, inject_time, log_measures, ComposedOutput, DecoderStage, Feedback, Field,
    FilteredOutput, Input, Measure, MeasureReader, MergedInput, MergedOutput, Output,
    PipelineBuilder, ProducerInput, Result as PipelineResult, SinkerStage,
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn host(name: &'static str, samples: i64) -> ProducerInput {
    ProducerInput::from_measures(
        (0..samples)
            .flat_map(|i| {
                [
                    Measure::new("cpu", i)
                        .with_tag("host", name)
                        .with_field(Field::new("load", (i % 10) as f64 / 10.0)),
                    Measure::new("mem", i)
                        .with_tag("host", name)
                        .with_field(Field::new("used", 512 + i)),
                ]
            })
            .collect(),
    )
    .with_name(name)
}

fn discard() -> impl Output {
    |_fb: &Feedback, reader: MeasureReader| -> PipelineResult<()> {
        for measure in reader {
            measure?;
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start = Instant::now();

    let hosts: Vec<Box<dyn Input>> = vec![Box::new(host("web-1", 5)), Box::new(host("web-2", 3))];
    let printing: Box<dyn Output> = Box::new(ComposedOutput::new(
        Box::new(DecoderStage::json_lines()),
        Box::new(SinkerStage::stdout()),
    ));
    let counting: Box<dyn Output> =
        Box::new(FilteredOutput::new(Box::new(count_measures()), Box::new(discard())));

    let pipeline = PipelineBuilder::new()
        .name("fan-out")
        .input(MergedInput::new(hosts)?)
        .filter(inject_time(1_257_894_000_000_000_000))
        .filter(log_measures("merged"))
        .output(MergedOutput::new(vec![printing, counting])?)
        .build()?;

    pipeline.run(&Feedback::tracing())?;

    tracing::info!("pipeline execution time: {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}
