use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use measure_stream::{
    passthrough, Collector, Feedback, Field, Input, Measure, MeasureReader, MergedInput,
    MergedOutput, Output, Pipeline, PipelineBuilder, ProducerInput, Result as PipelineResult,
};
use std::time::Duration;

fn measures(count: i64) -> Vec<Measure> {
    (0..count)
        .map(|i| {
            Measure::new("cpu", i)
                .with_tag("host", "bench-01")
                .with_tag("region", "eu-west")
                .with_field(Field::new("load", i as f64 / 10.0))
                .with_field(Field::new("cores", 8i64))
        })
        .collect()
}

fn counting() -> impl Output {
    |_fb: &Feedback, reader: MeasureReader| -> PipelineResult<()> {
        let mut seen = 0u64;
        for m in reader {
            black_box(m?);
            seen += 1;
        }
        black_box(seen);
        Ok(())
    }
}

fn benchmark_linear_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear");
    for filters in [1usize, 3] {
        group.throughput(Throughput::Elements(1000));
        group.bench_function(format!("{filters}_filters_1000_measures"), |b| {
            b.iter(|| {
                let mut builder =
                    PipelineBuilder::new().input(ProducerInput::from_measures(measures(1000)));
                for _ in 0..filters {
                    builder = builder.filter(passthrough());
                }
                let pipeline = builder.output(counting()).build().expect("Build failed");
                pipeline
                    .run(&Collector::new().feedback())
                    .expect("Run failed");
            });
        });
    }
    group.finish();
}

fn benchmark_fan_in_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("4_inputs_250_measures", |b| {
        b.iter(|| {
            let inputs: Vec<Box<dyn Input>> = (0..4)
                .map(|_| Box::new(ProducerInput::from_measures(measures(250))) as Box<dyn Input>)
                .collect();
            let pipeline = Pipeline::builder()
                .input(MergedInput::new(inputs).expect("Merge failed"))
                .filter(passthrough())
                .output(counting())
                .build()
                .expect("Build failed");
            pipeline
                .run(&Collector::new().feedback())
                .expect("Run failed");
        });
    });
    group.finish();
}

fn benchmark_fan_out_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("3_outputs_1000_measures", |b| {
        b.iter(|| {
            let outputs: Vec<Box<dyn Output>> = (0..3)
                .map(|_| Box::new(counting()) as Box<dyn Output>)
                .collect();
            let pipeline = Pipeline::builder()
                .input(ProducerInput::from_measures(measures(1000)))
                .filter(passthrough())
                .output(MergedOutput::new(outputs).expect("Merge failed"))
                .build()
                .expect("Build failed");
            pipeline
                .run(&Collector::new().feedback())
                .expect("Run failed");
        });
    });
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_linear_throughput, benchmark_fan_in_throughput, benchmark_fan_out_throughput
);
criterion_main!(benches);
