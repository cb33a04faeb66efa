//! Kernel lifecycle tests: geometry, execution, profiling time, output
//! image sizes and weight dequantization around a compute step.

use lite_accel_common::{
    DataType, OperatorKind, Precision, QuantParam, TensorData, TuneConfig, WeightTensor,
};
use lite_accel_opencl::image::ImageChannelType;
use lite_accel_opencl::{
    DeviceCapabilities, MAX_PROFILING_TIME_MS, MockDispatcher, NdRange, OpenClError, OpenClKernel,
};
use std::time::Duration;

fn conv_kernel(mock: MockDispatcher) -> OpenClKernel<MockDispatcher> {
    OpenClKernel::new("conv2d_3x3", OperatorKind::Conv2D, mock)
}

// ── Geometry and execution ───────────────────────────────────────────

#[test]
fn run_uses_aligned_plan() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    kernel.set_global_local(vec![30, 17, 3], vec![8, 4, 1]).unwrap();
    kernel.run().unwrap();

    let plan = &kernel.dispatcher().calls()[0];
    assert_eq!(plan.global_range(), NdRange::Three(32, 20, 3));
    assert_eq!(plan.local_range(), Some(NdRange::Three(8, 4, 1)));
    assert_eq!(plan.requested_global(), &[30, 17, 3]);
}

#[test]
fn null_local_leaves_global_untouched() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    kernel.set_global_local(vec![31, 7], vec![]).unwrap();
    kernel.run().unwrap();

    let plan = &kernel.dispatcher().calls()[0];
    assert_eq!(plan.aligned_global(), &[31, 7]);
    assert_eq!(plan.local_range(), None);
}

#[test]
fn profiling_time_reflects_last_launch() {
    let mock = MockDispatcher::new(DeviceCapabilities::mock()).with_timing(|plan| {
        Duration::from_micros(plan.total_work_items() as u64)
    });
    let mut kernel = conv_kernel(mock);
    kernel.set_global_local(vec![1000], vec![]).unwrap();
    kernel.run().unwrap();
    assert!((kernel.profiling_time_ms() - 1.0).abs() < 1e-9);
}

#[test]
fn profiling_time_without_launch_is_sentinel() {
    let kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    assert_eq!(kernel.profiling_time_ms(), MAX_PROFILING_TIME_MS);
}

#[test]
fn profiling_time_with_profiling_off_is_sentinel() {
    let mock = MockDispatcher::new(DeviceCapabilities::mock()).with_profiling(false);
    let mut kernel = conv_kernel(mock);
    kernel.set_global_local(vec![64], vec![8]).unwrap();
    kernel.run().unwrap();
    assert_eq!(kernel.profiling_time_ms(), MAX_PROFILING_TIME_MS);
}

#[test]
fn failed_launch_surfaces_run_error() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()).failing_always());
    kernel.set_global_local(vec![64], vec![8]).unwrap();
    let err = kernel.run().unwrap_err();
    assert!(matches!(
        err,
        OpenClError::Run(ref e) if e.code == lite_accel_opencl::mock::MOCK_FAILURE_CODE
    ));
}

#[test]
fn output_image_size_for_nhwc() {
    let shapes = vec![vec![1, 56, 56, 24], vec![1, 1000]];
    let config = TuneConfig { fp16_enabled: true, ..TuneConfig::default() };
    let half = OpenClKernel::from_config(
        "conv2d_3x3",
        OperatorKind::Conv2D,
        MockDispatcher::new(DeviceCapabilities::mock()),
        &config,
    )
    .with_output_shapes(shapes.clone());

    let fm = half.output_image_size(0).unwrap();
    assert_eq!((fm.width, fm.height), (56 * 6, 56));
    assert_eq!(fm.channel_type, ImageChannelType::HalfFloat);

    let full =
        conv_kernel(MockDispatcher::new(DeviceCapabilities::mock())).with_output_shapes(shapes);
    let logits = full.output_image_size(1).unwrap();
    assert_eq!((logits.width, logits.height), (250, 1));
    assert_eq!(logits.channel_type, ImageChannelType::Float);
}

// ── Dequantization ───────────────────────────────────────────────────

fn int8_weight() -> WeightTensor {
    WeightTensor::new("conv.weight", vec![2, 4], TensorData::I8(vec![0, 1, 2, 3, -4, -3, -2, -1]))
}

#[test]
fn weight_without_quant_params_is_untouched() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    let mut weight = int8_weight();
    let ptr = weight.data().unwrap().as_ptr();

    assert!(!kernel.dequant_weight(&mut weight).unwrap());
    assert!(!kernel.dequant_state().is_dequantized());
    kernel.free_dequanted_weight(&mut weight);

    assert_eq!(weight.data().unwrap().as_ptr(), ptr);
    assert_eq!(weight.data_type(), DataType::Int8);
}

#[test]
fn int8_weight_to_f32_keeps_original_until_release() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    let mut weight = int8_weight().with_quant_params(vec![QuantParam::new(0.5, 0)]);
    let ptr = weight.data().unwrap().as_ptr();

    assert!(kernel.dequant_weight(&mut weight).unwrap());
    let restored = weight.data().unwrap().as_f32().unwrap();
    assert_eq!(restored.len(), weight.element_count());
    assert_eq!(restored, &[0.0, 0.5, 1.0, 1.5, -2.0, -1.5, -1.0, -0.5]);
    assert_eq!(kernel.dequant_state().original().unwrap().as_ptr(), ptr);

    kernel.free_dequanted_weight(&mut weight);
    assert_eq!(weight.data().unwrap().as_ptr(), ptr);
    assert_eq!(weight.data_type(), DataType::Int8);
}

#[test]
fn per_channel_int8_to_f16() {
    let mut kernel =
        conv_kernel(MockDispatcher::new(DeviceCapabilities::mock())).with_precision(Precision::F16);
    let mut weight = int8_weight()
        .with_quant_params(vec![QuantParam::new(1.0, 0), QuantParam::new(2.0, -4)]);

    let values: Vec<f32> = kernel
        .run_with_dequantized_weight(&mut weight, |k, w| {
            k.set_global_local(vec![64], vec![8])?;
            k.run()?;
            Ok(w.data().unwrap().as_f16().unwrap().iter().map(|v| v.to_f32()).collect())
        })
        .unwrap();

    assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 0.0, 2.0, 4.0, 6.0]);
    assert_eq!(kernel.dispatcher().call_count(), 1);
    assert_eq!(weight.data_type(), DataType::Int8);
}

#[test]
fn int16_weight_is_restored() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    let data = TensorData::I16(vec![-1000, 0, 1000, 2000]);
    let mut weight = WeightTensor::new("fc.weight", vec![4], data)
        .with_quant_params(vec![QuantParam::new(0.001, 0)]);

    assert!(kernel.dequant_weight(&mut weight).unwrap());
    let restored = weight.data().unwrap().as_f32().unwrap();
    assert!((restored[0] + 1.0).abs() < 1e-6);
    assert!((restored[3] - 2.0).abs() < 1e-6);
    kernel.free_dequanted_weight(&mut weight);
    assert_eq!(weight.data_type(), DataType::Int16);
}

#[test]
fn mismatched_channel_params_fail_cleanly() {
    let mut kernel = conv_kernel(MockDispatcher::new(DeviceCapabilities::mock()));
    let mut weight = int8_weight().with_quant_params(vec![QuantParam::new(1.0, 0); 3]);

    let result: lite_accel_opencl::Result<()> =
        kernel.run_with_dequantized_weight(&mut weight, |_, _| Ok(()));

    assert!(matches!(result, Err(OpenClError::DequantShapeMismatch { elements: 8, channels: 3 })));
    assert_eq!(weight.data_type(), DataType::Int8);
    assert!(!kernel.dequant_state().is_dequantized());
}
