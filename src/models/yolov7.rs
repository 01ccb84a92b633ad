// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv7 检测器 (TensorRT 加速)
// 输出框为网络输入像素坐标, letterbox 填充灰色 128

use crate::config::{DetectorConfig, Interpolation, Normalization, PreprocessConfig};
use crate::detection::{ChannelOrder, Frame, ObjectDetection};
use crate::error::Result;
use crate::invoker::InferenceInvoker;
use crate::models::pipeline::DetectionPipeline;
use crate::models::Detector;
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
use crate::postprocess::BoxUnits;

const NAME: &str = "YOLOv7";

pub struct Yolov7<I: InferenceInvoker = OrtBackend> {
    pipeline: DetectionPipeline<I>,
}

impl Yolov7<OrtBackend> {
    /// 加载 ONNX 模型, `ep` 为首选执行提供器
    pub fn new(config: &DetectorConfig, model: &str, ep: OrtEP, fp16: bool) -> Result<Self> {
        let mut ort = OrtConfig::new(model, ep, config.spec);
        ort.trt_fp16 = fp16;
        let backend = OrtBackend::build(ort)?;
        Self::with_invoker(config, backend)
    }
}

impl<I: InferenceInvoker> Yolov7<I> {
    pub fn with_invoker(config: &DetectorConfig, invoker: I) -> Result<Self> {
        let pipeline = DetectionPipeline::new(
            NAME,
            config,
            Self::default_preprocess(),
            BoxUnits::Pixels,
            invoker,
        )?;
        Ok(Self { pipeline })
    }

    pub fn default_preprocess() -> PreprocessConfig {
        PreprocessConfig {
            pad_value: 128.0,
            normalization: Normalization::UnitScale,
            channel_order: ChannelOrder::Rgb,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl<I: InferenceInvoker> Detector for Yolov7<I> {
    fn get_detections(&mut self, frame: &Frame<'_>) -> Result<Vec<ObjectDetection>> {
        self.pipeline.detect(frame)
    }

    fn get_detections_batch(&mut self, frames: &[Frame<'_>]) -> Result<Vec<Vec<ObjectDetection>>> {
        self.pipeline.detect_batch(frames)
    }

    fn name(&self) -> &str {
        self.pipeline.name()
    }

    fn input_size(&self) -> (u32, u32) {
        let spec = self.pipeline.spec();
        (spec.input_width, spec.input_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkInputSpec, Thresholds};
    use crate::invoker::FixedOutputInvoker;

    #[test]
    fn test_yolov7_maps_pixel_boxes() {
        let spec = NetworkInputSpec::new(640, 640, 1, 80, 4).unwrap();
        let config = DetectorConfig::new(spec, Thresholds::default());
        let mut output = vec![0.0f32; spec.output_len()];
        // 网络空间中心 (320, 300), 宽高 100, class 3
        output[0..5].copy_from_slice(&[320.0, 300.0, 100.0, 100.0, 0.95]);
        output[5 + 3] = 0.9;

        let mut det = Yolov7::with_invoker(&config, FixedOutputInvoker::new(output)).unwrap();
        assert_eq!(det.input_size(), (640, 640));
        assert_eq!(det.name(), "YOLOv7");

        let data = vec![0u8; 1280 * 720 * 3];
        let dets = det.get_detections(&Frame::new(&data, 1280, 720)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].id, 3);
        assert!((dets[0].center_x - 640.0).abs() < 1e-3);
        assert!((dets[0].center_y - 320.0).abs() < 1e-3);
        assert!((dets[0].width_half - 100.0).abs() < 1e-3);
        assert!((dets[0].height_half - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_default_preprocess() {
        let pre = Yolov7::<FixedOutputInvoker>::default_preprocess();
        assert_eq!(pre.pad_value, 128.0);
        assert!(pre.validate().is_ok());
    }
}
