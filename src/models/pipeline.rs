// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测流水线: 预处理 -> 推理 -> 后处理 (NMS) -> 组装
//
// 输入/输出缓冲区在构造时按网络规格分配一次, 之后每次调用复用。
// 同一实例的调用必须串行; 不同实例之间没有共享可变状态。

use std::time::Instant;

use ndarray::Array4;
use tracing::{debug, info};

use crate::assemble::assemble;
use crate::config::{
    BoundaryPolicy, DetectorConfig, NetworkInputSpec, PreprocessConfig, Thresholds,
};
use crate::detection::{Frame, ObjectDetection};
use crate::error::{DetectError, Result};
use crate::invoker::InferenceInvoker;
use crate::postprocess::{BoxUnits, Postprocessor};
use crate::preprocess::BatchPreprocessor;

/// 每个检测器实例独占的推理缓冲区
struct ScratchBuffers {
    input: Array4<f32>,
    output: Vec<f32>,
}

impl ScratchBuffers {
    fn new(spec: &NetworkInputSpec) -> Self {
        Self {
            input: Array4::zeros(spec.input_shape()),
            output: vec![0.0; spec.output_len()],
        }
    }
}

pub struct DetectionPipeline<I: InferenceInvoker> {
    name: String,
    spec: NetworkInputSpec,
    boundary: BoundaryPolicy,
    preprocessor: BatchPreprocessor,
    postprocessor: Postprocessor,
    invoker: I,
    buffers: ScratchBuffers,
}

impl<I: InferenceInvoker> DetectionPipeline<I> {
    /// `preprocess` 为后端默认预处理, 会被 `config.preprocess` 覆盖
    pub fn new(
        name: impl Into<String>,
        config: &DetectorConfig,
        preprocess: PreprocessConfig,
        units: BoxUnits,
        invoker: I,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        info!("{} 初始化开始", name);

        let preprocess = config.preprocess.clone().unwrap_or(preprocess);
        let pipeline = Self {
            spec: config.spec,
            boundary: config.boundary,
            preprocessor: BatchPreprocessor::new(preprocess)?,
            postprocessor: Postprocessor::new(config.spec, config.thresholds, units),
            invoker,
            buffers: ScratchBuffers::new(&config.spec),
            name,
        };

        info!(
            "{} 初始化完成: 输入 {}x{}, batch={}, nc={}, max_det={}, invoker={}",
            pipeline.name,
            pipeline.spec.input_width,
            pipeline.spec.input_height,
            pipeline.spec.batch_size,
            pipeline.spec.num_classes,
            pipeline.spec.max_detections_per_image,
            pipeline.invoker.name()
        );
        debug!(
            "{} conf={}, nms={}, pad={}",
            pipeline.name,
            pipeline.thresholds().conf,
            pipeline.thresholds().nms,
            pipeline.preprocess_config().pad_value
        );
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &NetworkInputSpec {
        &self.spec
    }

    pub fn thresholds(&self) -> &Thresholds {
        self.postprocessor.thresholds()
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        self.preprocessor.config()
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// 检测一批图像, 结果第 i 项对应第 i 张输入
    ///
    /// 空批次直接返回空结果, 不调用推理。
    pub fn detect_batch(&mut self, frames: &[Frame<'_>]) -> Result<Vec<Vec<ObjectDetection>>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let t_pre = Instant::now();
        let transforms = self
            .preprocessor
            .fill_batch(&mut self.buffers.input, frames, &self.spec)?;
        let pre_elapsed = t_pre.elapsed();

        let t_run = Instant::now();
        self.invoker
            .infer(self.buffers.input.view(), &mut self.buffers.output)
            .map_err(|e| {
                if e.is_invoker_failure() {
                    e
                } else {
                    DetectError::invoker(e.to_string())
                }
            })?;
        let run_elapsed = t_run.elapsed();

        let t_post = Instant::now();
        let kept = self
            .postprocessor
            .process_batch(&self.buffers.output, frames.len())?;
        let results: Vec<Vec<ObjectDetection>> = kept
            .iter()
            .zip(frames.iter().zip(&transforms))
            .map(|(dets, (frame, transform))| {
                assemble(
                    dets,
                    transform,
                    self.boundary,
                    frame.width(),
                    frame.height(),
                )
            })
            .collect();
        let post_elapsed = t_post.elapsed();

        debug!(
            "[{}] batch={} 预处理 {:?}, 推理 {:?}, 后处理 {:?}, 检测数 {:?}",
            self.name,
            frames.len(),
            pre_elapsed,
            run_elapsed,
            post_elapsed,
            results.iter().map(Vec::len).collect::<Vec<_>>()
        );
        Ok(results)
    }

    /// 检测单张图像
    pub fn detect(&mut self, frame: &Frame<'_>) -> Result<Vec<ObjectDetection>> {
        let mut results = self.detect_batch(std::slice::from_ref(frame))?;
        Ok(results.pop().unwrap_or_default())
    }
}

impl<I: InferenceInvoker> Drop for DetectionPipeline<I> {
    fn drop(&mut self) {
        info!("{} 销毁完成", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::FixedOutputInvoker;
    use ndarray::ArrayView4;

    fn config(batch: usize) -> DetectorConfig {
        let spec = NetworkInputSpec::new(64, 64, batch, 2, 2).unwrap();
        DetectorConfig::new(spec, Thresholds::default())
    }

    fn pipeline(
        config: &DetectorConfig,
        output: Vec<f32>,
    ) -> DetectionPipeline<FixedOutputInvoker> {
        DetectionPipeline::new(
            "test",
            config,
            PreprocessConfig::default(),
            BoxUnits::Pixels,
            FixedOutputInvoker::new(output),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_order_preserved() {
        let config = config(3);
        let spec = config.spec;
        let mut output = vec![0.0f32; spec.output_len()];
        for i in 0..3 {
            let at = i * spec.output_len_per_image();
            let cx = 10.0 + 10.0 * i as f32;
            output[at..at + 7].copy_from_slice(&[cx, 20.0, 4.0, 4.0, 1.0, 0.0, 0.9]);
        }
        let mut p = pipeline(&config, output);

        let data = vec![0u8; 64 * 64 * 3];
        let frames = [Frame::new(&data, 64, 64); 3];
        let results = p.detect_batch(&frames).unwrap();
        assert_eq!(results.len(), 3);
        for (i, dets) in results.iter().enumerate() {
            assert_eq!(dets.len(), 1);
            assert_eq!(dets[0].id, 1);
            assert!((dets[0].center_x - (10.0 + 10.0 * i as f32)).abs() < 1e-4);
        }
        assert_eq!(p.invoker().calls(), 1);
    }

    #[test]
    fn test_mixed_sizes_use_own_transform() {
        let config = config(2);
        let spec = config.spec;
        let mut output = vec![0.0f32; spec.output_len()];
        for i in 0..2 {
            let at = i * spec.output_len_per_image();
            output[at..at + 7].copy_from_slice(&[32.0, 32.0, 8.0, 8.0, 1.0, 0.9, 0.0]);
        }
        let mut p = pipeline(&config, output);

        let small = vec![0u8; 64 * 64 * 3];
        let wide = vec![0u8; 128 * 64 * 3];
        let results = p
            .detect_batch(&[Frame::new(&small, 64, 64), Frame::new(&wide, 128, 64)])
            .unwrap();
        assert!((results[0][0].center_x - 32.0).abs() < 1e-4);
        assert!((results[0][0].width_half - 4.0).abs() < 1e-4);
        // 128x64 -> scale 0.5, pad_y 16
        assert!((results[1][0].center_x - 64.0).abs() < 1e-4);
        assert!((results[1][0].center_y - 32.0).abs() < 1e-4);
        assert!((results[1][0].width_half - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_no_detections_is_empty() {
        let config = config(1);
        let mut p = pipeline(&config, vec![0.0; config.spec.output_len()]);
        let data = vec![0u8; 32 * 16 * 3];
        let dets = p.detect(&Frame::new(&data, 32, 16)).unwrap();
        assert!(dets.is_empty());
    }

    #[test]
    fn test_empty_batch_skips_inference() {
        let config = config(2);
        let mut p = pipeline(&config, vec![0.0; config.spec.output_len()]);
        let results = p.detect_batch(&[]).unwrap();
        assert!(results.is_empty());
        assert_eq!(p.invoker().calls(), 0);
    }

    #[test]
    fn test_batch_too_large() {
        let config = config(1);
        let mut p = pipeline(&config, vec![0.0; config.spec.output_len()]);
        let data = vec![0u8; 8 * 8 * 3];
        let frames = [Frame::new(&data, 8, 8); 2];
        assert!(matches!(
            p.detect_batch(&frames),
            Err(DetectError::Configuration(_))
        ));
        assert_eq!(p.invoker().calls(), 0);
    }

    struct FailingInvoker;

    impl InferenceInvoker for FailingInvoker {
        fn infer(&mut self, _input: ArrayView4<'_, f32>, _output: &mut [f32]) -> Result<()> {
            Err(DetectError::input("device lost"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_invoker_failure_is_reported() {
        let config = config(1);
        let mut p = DetectionPipeline::new(
            "failing",
            &config,
            PreprocessConfig::default(),
            BoxUnits::Pixels,
            FailingInvoker,
        )
        .unwrap();
        let data = vec![0u8; 8 * 8 * 3];
        let err = p.detect(&Frame::new(&data, 8, 8)).unwrap_err();
        assert!(err.is_invoker_failure());
    }
}
