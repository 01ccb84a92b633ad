/// 检测系统 (Detection System)
///
/// - types:  帧 / 原始检测 / 检测结果
/// - worker: 带超时看门狗的检测工作线程
pub mod types;
pub mod worker;

pub use types::{
    ChannelOrder, Frame, ObjectDetection, OwnedFrame, PixelLayout, RawDetection, FRAME_CHANNELS,
};
pub use worker::DetectionWorker;
