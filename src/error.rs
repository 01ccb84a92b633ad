// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测流水线错误类型

use thiserror::Error;

/// 检测流水线错误
///
/// 所有错误都在本次调用内向调用者返回, 流水线内部不做任何重试。
/// 检测结果为空不是错误, 返回空列表。
#[derive(Error, Debug)]
pub enum DetectError {
    /// 网络输入规格非法, 或批量超过 `batch_size`
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 图像为零面积或缓冲区长度不匹配
    #[error("输入错误: {0}")]
    Input(String),

    /// 推理调用失败 (设备/运行时错误), 缓冲区状态不再可信
    #[error("推理失败: {0}")]
    Invoker(String),

    /// 模型加载失败
    #[error("模型加载错误: {path}: {message}")]
    ModelLoad { path: String, message: String },
}

impl DetectError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        DetectError::Configuration(msg.into())
    }

    pub fn input(msg: impl Into<String>) -> Self {
        DetectError::Input(msg.into())
    }

    pub fn invoker(msg: impl Into<String>) -> Self {
        DetectError::Invoker(msg.into())
    }

    /// 是否为推理阶段的失败 (调用者应考虑重建检测器)
    pub fn is_invoker_failure(&self) -> bool {
        matches!(self, DetectError::Invoker(_))
    }
}

impl From<ort::Error> for DetectError {
    fn from(err: ort::Error) -> Self {
        DetectError::Invoker(err.to_string())
    }
}

pub type Result<T, E = DetectError> = std::result::Result<T, E>;
