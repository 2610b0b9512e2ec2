//! Measure counting pipeline over stdin
//!
//! Pipeline:
//! 1. Source: reads stdin
//! 2. Encoder: one measure per line, `name key=type:value ...`
//! 3. Filters: sanitize names, tag with the host, count per name
//! 4. Decoder + Sinker: JSON lines on stdout
//!
//! Usage: printf 'CPU Load load=float:0.5\nmem used=int:1024\n' | \
//!        RUST_LOG=info cargo run --example count_pipeline

use measure_stream::{
    count_measures, inject_tags, sanitize_name, DecoderStage, EncoderStage, Feedback, Field,
    Measure, MeasureWriter, PipelineBuilder, SinkerStage, SourceStage, Tag,
};
use std::io::{self, BufRead, BufReader, Read};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

/// Parse `name key=type:value ...`. Fields without a type token are strings.
fn parse_line(line: &str, time: i64) -> Option<Measure> {
    let mut name = Vec::new();
    let mut fields = Vec::new();
    for part in line.split_whitespace() {
        match part.split_once('=') {
            Some((key, rest)) => {
                let (kind, raw) = rest.split_once(':').unwrap_or(("string", rest));
                fields.push(Field::parse(key, kind, raw));
            }
            None if fields.is_empty() => name.push(part),
            None => return None,
        }
    }
    if name.is_empty() {
        return None;
    }
    let mut measure = Measure::new(name.join(" "), time);
    measure.fields = fields;
    Some(measure)
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

fn line_encoder() -> EncoderStage {
    EncoderStage::new(
        |fb: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter| {
            for (number, line) in BufReader::new(input).lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        fb.error(format!("error reading line {}: {err}", number + 1));
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line, now_nanos()) {
                    Some(measure) => out.write_or_report(&measure, fb),
                    None => fb.warn(format!("skipping malformed line {}", number + 1)),
                }
                if out.is_broken() {
                    break;
                }
            }
        },
    )
    .with_name("line-encoder")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let start = Instant::now();
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());

    let pipeline = PipelineBuilder::new()
        .name("count")
        .source(SourceStage::from_reader(io::stdin()).with_name("stdin"))
        .encoder(line_encoder())
        .filter(sanitize_name())
        .filter(inject_tags(vec![Tag::new("host", host)])?)
        .filter(count_measures())
        .decoder(DecoderStage::json_lines())
        .sinker(SinkerStage::stdout())
        .build()?;

    pipeline.run(&Feedback::tracing())?;

    tracing::info!("pipeline execution time: {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}
