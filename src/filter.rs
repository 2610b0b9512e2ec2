//! Filter stages.
//!
//! A [`FilterStage`] runs a [`Transform`] over every measure of its input on a
//! single worker. The transform may forward, rewrite, drop or inject
//! measures, and may keep state across the whole stream. Once the input
//! reaches end-of-stream, [`Transform::finish`] runs on the same worker, before
//! the output is closed.

use crate::codec::{measure_pipe, MeasureReader, MeasureWriter};
use crate::error::{PipelineError, Result};
use crate::feedback::Feedback;
use crate::measure::{Field, Measure, Tag};
use crate::metrics::StageMetrics;
use crate::stage::{spawn_worker, Filter};
use std::collections::BTreeMap;
use std::time::Instant;

/// Per-record logic of a filter stage
pub trait Transform: Send + 'static {
    /// Handle one measure. The measure is owned; whatever is written to `out`
    /// is what downstream sees.
    fn transform(&mut self, feedback: &Feedback, measure: Measure, out: &mut MeasureWriter);

    /// Called exactly once after the input has ended
    fn finish(&mut self, _feedback: &Feedback, _out: &mut MeasureWriter) {}
}

impl<F> Transform for F
where
    F: FnMut(&Feedback, Measure, &mut MeasureWriter) + Send + 'static,
{
    fn transform(&mut self, feedback: &Feedback, measure: Measure, out: &mut MeasureWriter) {
        self(feedback, measure, out)
    }
}

/// A filter driven by a [`Transform`] on its own worker
pub struct FilterStage {
    name: String,
    transform: Box<dyn Transform>,
    metrics: StageMetrics,
}

impl FilterStage {
    pub fn new(transform: impl Transform) -> Self {
        Self {
            name: "filter".to_string(),
            transform: Box::new(transform),
            metrics: StageMetrics::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Handle to the counters the worker will update
    pub fn metrics(&self) -> StageMetrics {
        self.metrics.clone()
    }
}

impl Filter for FilterStage {
    fn apply(self: Box<Self>, feedback: &Feedback, mut input: MeasureReader) -> Result<MeasureReader> {
        let FilterStage {
            name,
            mut transform,
            metrics,
        } = *self;
        let feedback = feedback.for_stage(&name);
        let (mut writer, reader) = measure_pipe();
        let fb = feedback.clone();
        spawn_worker(&feedback, move || {
            loop {
                match input.read() {
                    Ok(measure) => {
                        let start = Instant::now();
                        transform.transform(&fb, measure, &mut writer);
                        metrics.record_latency(start.elapsed().as_nanos() as u64);
                        metrics.record_processed();
                        if writer.is_broken() {
                            fb.error("downstream closed, stopping");
                            return;
                        }
                    }
                    Err(err) if err.is_end_of_stream() => {
                        transform.finish(&fb, &mut writer);
                        break;
                    }
                    Err(err) if err.is_fatal() => {
                        metrics.record_failed();
                        fb.error(format!("error on read: {err}"));
                        break;
                    }
                    Err(err) => {
                        metrics.record_failed();
                        fb.error(format!("error on read: {err}"));
                    }
                }
            }
            tracing::debug!(
                stage = %fb.stage(),
                "filter finished: {}",
                metrics.snapshot().format()
            );
        })?;
        Ok(reader)
    }
}

/// Threads a measure stream through filters in order
pub struct ChainFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl ChainFilter {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for ChainFilter {
    fn apply(self: Box<Self>, feedback: &Feedback, input: MeasureReader) -> Result<MeasureReader> {
        if self.filters.is_empty() {
            feedback
                .for_stage("chain")
                .warn("no filters in chain, passing measures through unchanged");
            return Ok(input);
        }
        let mut reader = input;
        for filter in self.filters {
            reader = filter.apply(feedback, reader)?;
        }
        Ok(reader)
    }
}

/// Sets a fixed timestamp on every measure
pub fn inject_time(time: i64) -> FilterStage {
    FilterStage::new(
        move |fb: &Feedback, mut m: Measure, out: &mut MeasureWriter| {
            m.time = time;
            out.write_or_report(&m, fb);
        },
    )
    .with_name("time-injector")
}

/// Sets a fixed name on every measure
pub fn inject_name(name: impl Into<String>) -> FilterStage {
    let name = name.into();
    FilterStage::new(
        move |fb: &Feedback, mut m: Measure, out: &mut MeasureWriter| {
            m.name.clone_from(&name);
            out.write_or_report(&m, fb);
        },
    )
    .with_name("name-injector")
}

/// Removes spaces from measure names and lowercases them
pub fn sanitize_name() -> FilterStage {
    FilterStage::new(|fb: &Feedback, mut m: Measure, out: &mut MeasureWriter| {
        m.name = m.name.replace(' ', "").to_lowercase();
        out.write_or_report(&m, fb);
    })
    .with_name("name-sanitizer")
}

/// Appends `tags` to every measure
pub fn inject_tags(tags: Vec<Tag>) -> Result<FilterStage> {
    if tags.is_empty() {
        return Err(PipelineError::Config("tag list is empty".into()));
    }
    Ok(FilterStage::new(
        move |fb: &Feedback, mut m: Measure, out: &mut MeasureWriter| {
            m.tags.extend(tags.iter().cloned());
            out.write_or_report(&m, fb);
        },
    )
    .with_name("tag-injector"))
}

/// Appends `fields` to every measure
pub fn inject_fields(fields: Vec<Field>) -> Result<FilterStage> {
    if fields.is_empty() {
        return Err(PipelineError::Config("field list is empty".into()));
    }
    Ok(FilterStage::new(
        move |fb: &Feedback, mut m: Measure, out: &mut MeasureWriter| {
            m.fields.extend(fields.iter().cloned());
            out.write_or_report(&m, fb);
        },
    )
    .with_name("field-injector"))
}

/// Forwards every measure unchanged
pub fn passthrough() -> FilterStage {
    FilterStage::new(|fb: &Feedback, m: Measure, out: &mut MeasureWriter| {
        out.write_or_report(&m, fb);
    })
    .with_name("passthrough")
}

/// Logs every measure as JSON under `label` and forwards it unchanged
pub fn log_measures(label: impl Into<String>) -> FilterStage {
    let label = label.into();
    FilterStage::new(
        move |fb: &Feedback, m: Measure, out: &mut MeasureWriter| {
            match serde_json::to_string(&m) {
                Ok(json) => tracing::info!(label = %label, "{}", json),
                Err(err) => fb.warn(format!("cannot render measure as json: {err}")),
            }
            out.write_or_report(&m, fb);
        },
    )
    .with_name("logger")
}

/// Counts measures per name and reports the totals, sorted by name, once the
/// input ends
#[derive(Debug, Default)]
pub struct MeasureCounter {
    counts: BTreeMap<String, u64>,
}

impl Transform for MeasureCounter {
    fn transform(&mut self, feedback: &Feedback, measure: Measure, out: &mut MeasureWriter) {
        *self.counts.entry(measure.name.clone()).or_insert(0) += 1;
        out.write_or_report(&measure, feedback);
    }

    fn finish(&mut self, feedback: &Feedback, _out: &mut MeasureWriter) {
        for (name, count) in &self.counts {
            feedback.info(format!("Total {name} records: {count}"));
        }
    }
}

pub fn count_measures() -> FilterStage {
    FilterStage::new(MeasureCounter::default()).with_name("counter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{Collector, Severity};
    use crate::measure::FieldValue;
    use std::thread;

    fn feed(measures: Vec<Measure>) -> MeasureReader {
        let (mut w, r) = measure_pipe();
        thread::spawn(move || {
            for m in &measures {
                w.write(m).unwrap();
            }
        });
        r
    }

    fn run(filter: impl Filter + 'static, measures: Vec<Measure>, fb: &Feedback) -> Vec<Measure> {
        let filter: Box<dyn Filter> = Box::new(filter);
        filter
            .apply(fb, feed(measures))
            .unwrap()
            .map(|m| m.unwrap())
            .collect()
    }

    #[test]
    fn test_time_and_name_injection() {
        let fb = Collector::new().feedback();
        let out = run(inject_time(99), vec![Measure::new("a", 1)], &fb);
        assert_eq!(out[0].time, 99);

        let out = run(inject_name("renamed"), vec![Measure::new("a", 1)], &fb);
        assert_eq!(out[0].name, "renamed");
    }

    #[test]
    fn test_sanitize_name() {
        let fb = Collector::new().feedback();
        let out = run(sanitize_name(), vec![Measure::new("CPU Load Avg", 1)], &fb);
        assert_eq!(out[0].name, "cpuloadavg");
    }

    #[test]
    fn test_tag_and_field_injection() {
        let fb = Collector::new().feedback();
        let source = vec![Measure::new("m", 1).with_tag("host", "a")];

        let out = run(
            inject_tags(vec![Tag::new("dc", "eu"), Tag::new("env", "prod")]).unwrap(),
            source.clone(),
            &fb,
        );
        let names: Vec<&str> = out[0].tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["host", "dc", "env"]);

        let out = run(inject_fields(vec![Field::new("v", 1i64)]).unwrap(), source, &fb);
        assert_eq!(out[0].field_value("v"), Some(&FieldValue::Int(1)));
    }

    #[test]
    fn test_empty_injection_lists_rejected() {
        assert!(matches!(inject_tags(vec![]), Err(PipelineError::Config(_))));
        assert!(matches!(inject_fields(vec![]), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_dropping_filter() {
        let fb = Collector::new().feedback();
        let keep_even = FilterStage::new(|fb: &Feedback, m: Measure, out: &mut MeasureWriter| {
            if m.time % 2 == 0 {
                out.write_or_report(&m, fb);
            }
        });
        let metrics = keep_even.metrics();
        let input: Vec<Measure> = (0..10).map(|i| Measure::new("n", i)).collect();
        let out = run(keep_even, input, &fb);
        let times: Vec<i64> = out.iter().map(|m| m.time).collect();
        assert_eq!(times, vec![0, 2, 4, 6, 8]);
        assert_eq!(metrics.total_processed(), 10);
    }

    #[test]
    fn test_counter_reports_sorted_totals() {
        let collector = Collector::new();
        let input = vec![
            Measure::new("mem", 1),
            Measure::new("cpu", 2),
            Measure::new("mem", 3),
            Measure::new("disk", 4),
            Measure::new("cpu", 5),
            Measure::new("mem", 6),
        ];
        let out = run(count_measures(), input.clone(), &collector.feedback());
        assert_eq!(out, input);
        assert_eq!(
            collector.messages(),
            vec![
                "Total cpu records: 2",
                "Total disk records: 1",
                "Total mem records: 3",
            ]
        );
        assert!(collector.reports().iter().all(|r| r.stage == "counter"));
    }

    #[test]
    fn test_finish_can_emit_summary_record() {
        struct Summer {
            total: i64,
        }

        impl Transform for Summer {
            fn transform(&mut self, _fb: &Feedback, m: Measure, _out: &mut MeasureWriter) {
                self.total += m.time;
            }

            fn finish(&mut self, fb: &Feedback, out: &mut MeasureWriter) {
                out.write_or_report(&Measure::new("sum", self.total), fb);
            }
        }

        let fb = Collector::new().feedback();
        let input: Vec<Measure> = (1..=4).map(|i| Measure::new("n", i)).collect();
        let out = run(FilterStage::new(Summer { total: 0 }), input, &fb);
        assert_eq!(out, vec![Measure::new("sum", 10)]);
    }

    #[test]
    fn test_chain_preserves_order() {
        let fb = Collector::new().feedback();
        let chain = ChainFilter::new(vec![
            Box::new(passthrough()),
            Box::new(sanitize_name()),
            Box::new(passthrough()),
        ]);
        assert_eq!(chain.len(), 3);
        let input: Vec<Measure> = (0..50).map(|i| Measure::new("A B", i)).collect();
        let out = run(chain, input, &fb);
        let times: Vec<i64> = out.iter().map(|m| m.time).collect();
        assert_eq!(times, (0..50).collect::<Vec<_>>());
        assert!(out.iter().all(|m| m.name == "ab"));
    }

    #[test]
    fn test_empty_chain_warns_and_passes_through() {
        let collector = Collector::new();
        let input = vec![Measure::new("a", 1), Measure::new("b", 2)];
        let out = run(ChainFilter::new(vec![]), input.clone(), &collector.feedback());
        assert_eq!(out, input);
        assert_eq!(collector.count(Severity::Warn), 1);
    }

    #[test]
    fn test_chain_stops_at_failing_filter() {
        let fb = Collector::new().feedback();
        let failing = |_fb: &Feedback, _r: MeasureReader| -> Result<MeasureReader> {
            Err(PipelineError::Stage("refused".into()))
        };
        let chain: Box<dyn Filter> =
            Box::new(ChainFilter::new(vec![Box::new(passthrough()), Box::new(failing)]));
        let err = chain.apply(&fb, feed(vec![])).err().unwrap();
        assert!(matches!(err, PipelineError::Stage(_)));
    }

    #[test]
    fn test_corrupt_input_reported_and_skipped() {
        let collector = Collector::new();
        let corrupt = MeasureReader::new(std::io::Cursor::new(vec![0x01]));
        let filter: Box<dyn Filter> = Box::new(passthrough());
        let out: Vec<Measure> = filter
            .apply(&collector.feedback(), corrupt)
            .unwrap()
            .map(|m| m.unwrap())
            .collect();
        assert!(out.is_empty());
        assert_eq!(collector.count(Severity::Error), 1);
    }
}
