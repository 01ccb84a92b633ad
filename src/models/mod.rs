/// 检测器统一接口与实现
///
/// # 架构说明
///
/// ## 检测流水线 (DetectionPipeline)
/// 所有后端共用同一条流水线: preprocess → infer → postprocess (NMS) → assemble
/// - 文件: `pipeline.rs`
///
/// ## 后端 (Backends)
/// - **YOLOv7**: TensorRT 执行提供器 (回退 CUDA / CPU), 输出像素坐标
///   - 文件: `yolov7.rs`
/// - **Darknet**: CPU 执行提供器, 输出归一化坐标
///   - 文件: `darknet.rs`
///
/// ## 使用示例
/// ```no_run
/// use vimba_detect::config::{BackendKind, DetectorConfig, NetworkInputSpec, Thresholds};
/// use vimba_detect::detection::Frame;
/// use vimba_detect::ort_backend::OrtEP;
///
/// let spec = NetworkInputSpec::new(640, 640, 1, 80, 1000)?;
/// let config = DetectorConfig::new(spec, Thresholds::default());
/// let mut detector = BackendKind::Yolov7.create(&config, "yolov7.onnx", OrtEP::Trt(0), false)?;
///
/// let pixels = vec![0u8; 1280 * 720 * 3];
/// let detections = detector.get_detections(&Frame::new(&pixels, 1280, 720))?;
/// # Ok::<(), vimba_detect::DetectError>(())
/// ```
pub mod darknet;
pub mod pipeline;
pub mod yolov7;

pub use darknet::Darknet;
pub use pipeline::DetectionPipeline;
pub use yolov7::Yolov7;

use tracing::warn;

use crate::config::{BackendKind, DetectorConfig};
use crate::detection::{Frame, ObjectDetection};
use crate::error::Result;
use crate::ort_backend::OrtEP;

/// 检测器公共接口
pub trait Detector: Send {
    /// 检测单张图像
    fn get_detections(&mut self, frame: &Frame<'_>) -> Result<Vec<ObjectDetection>>;

    /// 批量检测, 结果第 i 项对应第 i 张图像
    fn get_detections_batch(&mut self, frames: &[Frame<'_>]) -> Result<Vec<Vec<ObjectDetection>>>;

    fn name(&self) -> &str;

    /// 网络输入尺寸 (宽, 高)
    fn input_size(&self) -> (u32, u32);
}

impl BackendKind {
    /// 创建对应后端的检测器
    ///
    /// Darknet 只在 CPU 上运行, 忽略 `ep` 与 `fp16`。
    pub fn create(
        &self,
        config: &DetectorConfig,
        model: &str,
        ep: OrtEP,
        fp16: bool,
    ) -> Result<Box<dyn Detector>> {
        match self {
            BackendKind::Yolov7 => Ok(Box::new(Yolov7::new(config, model, ep, fp16)?)),
            BackendKind::Darknet => {
                if ep != OrtEP::CPU {
                    warn!("Darknet 仅支持 CPU, 忽略执行提供器 {:?}", ep);
                }
                Ok(Box::new(Darknet::new(config.thresholds.conf, config, model)?))
            }
        }
    }
}
