// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod assemble; // 网络空间 -> 原图坐标
pub mod config; // 检测器配置参数
pub mod detection; // 帧 / 检测结果 / 工作线程
pub mod error;
pub mod invoker; // 推理调用接口
pub mod models; // 检测器接口与后端实现
pub mod ort_backend;
pub mod postprocess; // 解码 + NMS
pub mod preprocess; // letterbox 预处理
pub mod utils;

pub use crate::config::{
    Args, BackendKind, BoundaryPolicy, DetectorConfig, NetworkInputSpec, PreprocessConfig,
    Thresholds,
};
pub use crate::detection::{DetectionWorker, Frame, ObjectDetection, OwnedFrame};
pub use crate::error::{DetectError, Result};
pub use crate::invoker::{FixedOutputInvoker, InferenceInvoker};
pub use crate::models::{Darknet, DetectionPipeline, Detector, Yolov7};
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
pub use crate::utils::LetterboxTransform;

/// 当前本地时间字符串, 各字段以 `delimiter` 分隔
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = ["%Y", "%m", "%d", "%H", "%M", "%S", "%f"].join(delimiter);
    chrono::Local::now().format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gen_time_string() {
        let s = gen_time_string("-");
        assert_eq!(s.split('-').count(), 7);
    }
}
