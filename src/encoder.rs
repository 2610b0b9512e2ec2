use crate::codec::{measure_pipe, MeasureReader, MeasureWriter};
use crate::error::Result;
use crate::feedback::Feedback;
use crate::stage::{spawn_worker, ByteStream, Encoder};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::marker::PhantomData;

/// Reads raw bytes and writes the measures they describe
pub trait Encode: Send + 'static {
    fn encode(&mut self, feedback: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter);
}

impl<F> Encode for F
where
    F: FnMut(&Feedback, &mut dyn Read, &mut MeasureWriter) + Send + 'static,
{
    fn encode(&mut self, feedback: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter) {
        self(feedback, input, out)
    }
}

/// An encoder driven by an [`Encode`] adapter on its own worker
pub struct EncoderStage {
    name: String,
    adapter: Box<dyn Encode>,
}

impl EncoderStage {
    pub fn new(adapter: impl Encode) -> Self {
        Self {
            name: "encoder".to_string(),
            adapter: Box::new(adapter),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Encoder for EncoderStage {
    fn encode(self: Box<Self>, feedback: &Feedback, mut input: ByteStream) -> Result<MeasureReader> {
        let EncoderStage { name, mut adapter } = *self;
        let feedback = feedback.for_stage(&name);
        let (mut writer, reader) = measure_pipe();
        let fb = feedback.clone();
        spawn_worker(&feedback, move || {
            adapter.encode(&fb, &mut input, &mut writer);
            tracing::debug!(stage = %fb.stage(), "encoder input exhausted");
        })?;
        Ok(reader)
    }
}

/// Decodes a stream of JSON documents into `T` and converts each document
/// into measures.
///
/// A conversion failure is reported and the next document is read. A JSON
/// syntax error ends the stream, since no later document boundary can be
/// trusted.
pub struct JsonEncoder<T, C> {
    convert: C,
    _doc: PhantomData<fn() -> T>,
}

impl<T, C> JsonEncoder<T, C>
where
    T: DeserializeOwned + 'static,
    C: FnMut(T, &mut MeasureWriter) -> Result<()> + Send + 'static,
{
    pub fn new(convert: C) -> Self {
        Self {
            convert,
            _doc: PhantomData,
        }
    }

    pub fn into_stage(self) -> EncoderStage {
        EncoderStage::new(self).with_name("json-encoder")
    }
}

impl<T, C> Encode for JsonEncoder<T, C>
where
    T: DeserializeOwned + 'static,
    C: FnMut(T, &mut MeasureWriter) -> Result<()> + Send + 'static,
{
    fn encode(&mut self, feedback: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter) {
        let docs = serde_json::Deserializer::from_reader(input).into_iter::<T>();
        for doc in docs {
            match doc {
                Ok(doc) => {
                    if let Err(err) = (self.convert)(doc, out) {
                        feedback.error(format!("error converting json document: {err}"));
                    }
                    if out.is_broken() {
                        break;
                    }
                }
                Err(err) => {
                    feedback.error(format!("error decoding json: {err}"));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Collector;
    use crate::measure::{Field, Measure};
    use crate::source::SourceStage;
    use crate::stage::Source;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
        at: i64,
    }

    fn reading_encoder() -> EncoderStage {
        JsonEncoder::new(|r: Reading, out: &mut MeasureWriter| -> Result<()> {
            let m = Measure::new("reading", r.at)
                .with_tag("sensor", r.sensor)
                .with_field(Field::new("value", r.value));
            out.write(&m)?;
            Ok(())
        })
        .into_stage()
    }

    #[test]
    fn test_adapter_encoder_one_measure_per_line() {
        let collector = Collector::new();
        let fb = collector.feedback();
        let encoder = Box::new(EncoderStage::new(
            |fb: &Feedback, input: &mut dyn Read, out: &mut MeasureWriter| {
                let mut text = String::new();
                if let Err(err) = input.read_to_string(&mut text) {
                    fb.error(err.to_string());
                    return;
                }
                for (i, line) in text.lines().enumerate() {
                    out.write_or_report(&Measure::new(line, i as i64), fb);
                }
            },
        ));
        let input: ByteStream = Box::new(Cursor::new(b"a\nb\nc".to_vec()));
        let reader = encoder.encode(&fb, input).unwrap();
        let names: Vec<String> = reader.map(|m| m.unwrap().name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_json_encoder_stream() {
        let collector = Collector::new();
        let fb = collector.feedback();
        let docs = r#"{"sensor":"t1","value":1.5,"at":10}
{"sensor":"t2","value":2.5,"at":20}"#;
        let source = Box::new(SourceStage::from_reader(Cursor::new(docs.as_bytes().to_vec())));
        let stream = source.open(&fb).unwrap();
        let measures: Vec<Measure> = Box::new(reading_encoder())
            .encode(&fb, stream)
            .unwrap()
            .map(|m| m.unwrap())
            .collect();

        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].tag_value("sensor"), Some("t1"));
        assert_eq!(measures[1].time, 20);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_json_encoder_reports_bad_document() {
        let collector = Collector::new();
        let fb = collector.feedback();
        let docs = r#"{"sensor":"t1","value":1.5,"at":10} {"sensor": oops"#;
        let input: ByteStream = Box::new(Cursor::new(docs.as_bytes().to_vec()));
        let measures: Vec<Measure> = Box::new(reading_encoder())
            .encode(&fb, input)
            .unwrap()
            .map(|m| m.unwrap())
            .collect();

        assert_eq!(measures.len(), 1);
        let reports = collector.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].stage, "json-encoder");
        assert!(reports[0].message.starts_with("error decoding json"));
    }
}
