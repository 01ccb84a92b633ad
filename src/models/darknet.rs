// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// Darknet 经典网络检测器 (CPU)
// 网络输出的框坐标相对输入画布归一化, 解码时换算为像素

use tracing::debug;

use crate::config::{DetectorConfig, Interpolation, Normalization, PreprocessConfig, Thresholds};
use crate::detection::{ChannelOrder, Frame, ObjectDetection};
use crate::error::Result;
use crate::invoker::InferenceInvoker;
use crate::models::pipeline::DetectionPipeline;
use crate::models::Detector;
use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
use crate::postprocess::BoxUnits;

const NAME: &str = "Darknet";

pub struct Darknet<I: InferenceInvoker = OrtBackend> {
    pipeline: DetectionPipeline<I>,
}

impl Darknet<OrtBackend> {
    /// `thresh` 为检测置信度阈值, 覆盖 `config` 中的 conf
    pub fn new(thresh: f32, config: &DetectorConfig, model: &str) -> Result<Self> {
        let backend = OrtBackend::build(OrtConfig::new(model, OrtEP::CPU, config.spec))?;
        Self::with_invoker(thresh, config, backend)
    }
}

impl<I: InferenceInvoker> Darknet<I> {
    pub fn with_invoker(thresh: f32, config: &DetectorConfig, invoker: I) -> Result<Self> {
        let mut config = config.clone();
        config.thresholds = Thresholds::new(thresh, config.thresholds.nms)?;
        debug!("Darknet 阈值: conf={}, nms={}", thresh, config.thresholds.nms);

        let pipeline = DetectionPipeline::new(
            NAME,
            &config,
            Self::default_preprocess(),
            BoxUnits::Normalized,
            invoker,
        )?;
        Ok(Self { pipeline })
    }

    pub fn default_preprocess() -> PreprocessConfig {
        PreprocessConfig {
            pad_value: 127.5,
            normalization: Normalization::UnitScale,
            channel_order: ChannelOrder::Rgb,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl<I: InferenceInvoker> Detector for Darknet<I> {
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
    use crate::config::NetworkInputSpec;
    use crate::error::DetectError;
    use crate::invoker::FixedOutputInvoker;

    fn config() -> DetectorConfig {
        let spec = NetworkInputSpec::new(416, 416, 1, 2, 2).unwrap();
        DetectorConfig::new(spec, Thresholds::default())
    }

    #[test]
    fn test_normalized_boxes_and_threshold() {
        let config = config();
        #[rustfmt::skip]
        let output = vec![
            0.5, 0.5, 0.25, 0.25, 1.0, 0.3, 0.0,  // conf 0.3
            0.25, 0.25, 0.1, 0.1, 1.0, 0.0, 0.1,  // conf 0.1
        ];

        // 阈值 0.2: 只保留第一行
        let mut det = Darknet::with_invoker(0.2, &config, FixedOutputInvoker::new(output)).unwrap();
        assert_eq!(det.pipeline.thresholds().conf, 0.2);
        assert_eq!(det.pipeline.preprocess_config().pad_value, 127.5);
        let data = vec![0u8; 416 * 416 * 3];
        let dets = det.get_detections(&Frame::new(&data, 416, 416)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].id, 0);
        assert!((dets[0].center_x - 208.0).abs() < 1e-3);
        assert!((dets[0].width_half - 52.0).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_thresh() {
        let config = config();
        let output = vec![0.0; config.spec.output_len()];
        assert!(matches!(
            Darknet::with_invoker(1.5, &config, FixedOutputInvoker::new(output)),
            Err(DetectError::Configuration(_))
        ));
    }
}
