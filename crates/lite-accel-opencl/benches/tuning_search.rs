use criterion::{Criterion, criterion_group, criterion_main};
use lite_accel_common::{Precision, QuantParam, TensorData, WeightTensor};
use lite_accel_opencl::dequant::dequantize_data;
use lite_accel_opencl::{DeviceLimits, TuningCandidate, generate_tuning_params, search};
use std::hint::black_box;
use std::time::Duration;

fn bench_generate_params(c: &mut Criterion) {
    let limits = DeviceLimits::new([1024, 1024, 64], 1024);
    let baseline = TuningCandidate::new(vec![16, 16, 1]);

    c.bench_function("generate_tuning_params_1024x1024x64", |b| {
        b.iter(|| {
            let global = black_box(&[1024, 1024, 64]);
            let params = generate_tuning_params(global, &baseline, &limits).unwrap();
            black_box(params);
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let limits = DeviceLimits::new([256, 256, 64], 256);
    let baseline = TuningCandidate::default();

    c.bench_function("search_scripted_224x224x32", |b| {
        b.iter(|| {
            let result = search("conv2d", black_box(&[224, 224, 32]), &baseline, &limits, |plan| {
                let groups = plan.total_work_groups().unwrap_or(1) as u64;
                Ok(Duration::from_nanos(1_000 + groups % 977))
            })
            .unwrap();
            black_box(result);
        })
    });
}

fn bench_dequant(c: &mut Criterion) {
    let elements = 64 * 3 * 3 * 256;
    let data: Vec<i8> = (0..elements).map(|i| (i % 255) as i8).collect();
    let params: Vec<QuantParam> =
        (0..64i32).map(|i| QuantParam::new(0.01 * f64::from(i + 1), 0)).collect();
    let weight = WeightTensor::new("w", vec![64, 3, 3, 256], TensorData::I8(data))
        .with_quant_params(params);

    c.bench_function("dequant_int8_per_channel_f16", |b| {
        b.iter(|| {
            let restored = dequantize_data(black_box(&weight), Precision::F16).unwrap();
            black_box(restored);
        })
    });
}

criterion_group!(benches, bench_generate_params, bench_search, bench_dequant);
criterion_main!(benches);
