// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测器配置参数
// - NetworkInputSpec: 网络输入张量规格 (模型加载时确定, 之后不可变)
// - Thresholds:       置信度 / NMS 阈值
// - PreprocessConfig: 填充值与归一化方式 (必须与模型训练时一致)
// - Args:             命令行参数

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::detection::ChannelOrder;
use crate::error::{DetectError, Result};
use crate::ort_backend::OrtEP;

/// 默认置信度阈值
pub const DEFAULT_CONF_THRESH: f32 = 0.5;
/// 默认 NMS IoU 阈值
pub const DEFAULT_NMS_THRESH: f32 = 0.4;

/// 网络输入张量规格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInputSpec {
    pub input_width: u32,
    pub input_height: u32,
    pub batch_size: usize,
    pub num_classes: usize,
    pub max_detections_per_image: usize,
}

impl NetworkInputSpec {
    pub fn new(
        input_width: u32,
        input_height: u32,
        batch_size: usize,
        num_classes: usize,
        max_detections_per_image: usize,
    ) -> Result<Self> {
        let spec = Self {
            input_width,
            input_height,
            batch_size,
            num_classes,
            max_detections_per_image,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::configuration(format!(
                "网络输入尺寸非法: {}x{}",
                self.input_width, self.input_height
            )));
        }
        if self.batch_size == 0 {
            return Err(DetectError::configuration("batch_size 不能为 0"));
        }
        if self.num_classes == 0 {
            return Err(DetectError::configuration("num_classes 不能为 0"));
        }
        if self.max_detections_per_image == 0 {
            return Err(DetectError::configuration(
                "max_detections_per_image 不能为 0",
            ));
        }
        Ok(())
    }

    /// 每个检测行的长度: cx, cy, w, h, objectness + 各类别分数
    pub fn row_len(&self) -> usize {
        5 + self.num_classes
    }

    /// 单张图像在输出缓冲区中占用的 f32 数
    pub fn output_len_per_image(&self) -> usize {
        self.max_detections_per_image * self.row_len()
    }

    /// 整个输出缓冲区长度
    pub fn output_len(&self) -> usize {
        self.batch_size * self.output_len_per_image()
    }

    /// 输入张量形状 (N, C, H, W)
    pub fn input_shape(&self) -> (usize, usize, usize, usize) {
        (
            self.batch_size,
            3,
            self.input_height as usize,
            self.input_width as usize,
        )
    }
}

/// 置信度 / NMS 阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub conf: f32,
    pub nms: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conf: DEFAULT_CONF_THRESH,
            nms: DEFAULT_NMS_THRESH,
        }
    }
}

impl Thresholds {
    pub fn new(conf: f32, nms: f32) -> Result<Self> {
        let t = Self { conf, nms };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.conf.is_finite() || !(0.0..=1.0).contains(&self.conf) {
            return Err(DetectError::configuration(format!(
                "置信度阈值必须在 [0, 1] 内: {}",
                self.conf
            )));
        }
        if !self.nms.is_finite() || !(0.0..=1.0).contains(&self.nms) {
            return Err(DetectError::configuration(format!(
                "NMS 阈值必须在 [0, 1] 内: {}",
                self.nms
            )));
        }
        Ok(())
    }
}

/// 像素归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// x / 255
    UnitScale,
    /// (x / 255 - mean) / std
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    /// 归一化单个通道值 (输入为 0-255 像素值)
    #[inline]
    pub fn apply(&self, value: f32, channel: usize) -> f32 {
        match self {
            Normalization::UnitScale => value / 255.0,
            Normalization::MeanStd { mean, std } => (value / 255.0 - mean[channel]) / std[channel],
        }
    }
}

/// 采样插值方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Bilinear,
}

/// 预处理配置
///
/// 填充值和归一化方式必须与模型训练/标定时一致, 因此每个后端都有自己的默认值,
/// 也可以从 JSON 文件加载覆盖。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// 填充像素值 (0-255 像素域, 归一化前)
    pub pad_value: f32,
    pub normalization: Normalization,
    /// 模型期望的通道顺序
    pub channel_order: ChannelOrder,
    pub interpolation: Interpolation,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            pad_value: 128.0,
            normalization: Normalization::UnitScale,
            channel_order: ChannelOrder::Rgb,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl PreprocessConfig {
    /// 从 JSON 文件加载
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DetectError::configuration(format!("无法读取预处理配置 {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| DetectError::configuration(format!("预处理配置解析失败: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=255.0).contains(&self.pad_value) {
            return Err(DetectError::configuration(format!(
                "填充值必须在 [0, 255] 内: {}",
                self.pad_value
            )));
        }
        if let Normalization::MeanStd { std, .. } = self.normalization {
            if std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(DetectError::configuration("归一化 std 不能为 0"));
            }
        }
        Ok(())
    }
}

/// 检测框越界处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// 保持逆映射结果 (可能略超出原图)
    #[default]
    Keep,
    /// 裁剪到 [0, w] x [0, h]
    Clip,
}

/// 检测后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// TensorRT 加速 (YOLOv7)
    Yolov7,
    /// 经典网络 (Darknet, CPU)
    Darknet,
}

/// 构造检测器所需的全部配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub spec: NetworkInputSpec,
    pub thresholds: Thresholds,
    /// None 表示使用后端默认值
    pub preprocess: Option<PreprocessConfig>,
    pub boundary: BoundaryPolicy,
}

impl DetectorConfig {
    pub fn new(spec: NetworkInputSpec, thresholds: Thresholds) -> Self {
        Self {
            spec,
            thresholds,
            preprocess: None,
            boundary: BoundaryPolicy::Keep,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.spec.validate()?;
        self.thresholds.validate()?;
        if let Some(pre) = &self.preprocess {
            pre.validate()?;
        }
        Ok(())
    }
}

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "目标检测 (letterbox + NMS)", long_about = None)]
pub struct Args {
    /// ONNX 模型路径
    #[arg(long, required = true)]
    pub model: String,

    /// 输入图片路径 (可多个)
    #[arg(long, num_args = 1..)]
    pub source: Vec<PathBuf>,

    /// 检测后端
    #[arg(long, value_enum, default_value_t = BackendKind::Yolov7)]
    pub backend: BackendKind,

    /// 使用 TensorRT
    #[arg(long)]
    pub trt: bool,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// 设备 ID
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// TensorRT FP16
    #[arg(long)]
    pub fp16: bool,

    /// 置信度阈值
    #[arg(long, default_value_t = DEFAULT_CONF_THRESH)]
    pub conf: f32,

    /// NMS IoU 阈值
    #[arg(long, default_value_t = DEFAULT_NMS_THRESH)]
    pub iou: f32,

    /// 网络输入宽度
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// 网络输入高度
    #[arg(long, default_value_t = 640)]
    pub height: u32,

    /// 批大小
    #[arg(long, default_value_t = 1)]
    pub batch: usize,

    /// 类别数量
    #[arg(long, default_value_t = 80)]
    pub nc: usize,

    /// 每张图像的最大检测行数
    #[arg(long, default_value_t = 1000)]
    pub max_det: usize,

    /// 预处理配置 (JSON)
    #[arg(long)]
    pub preprocess: Option<PathBuf>,

    /// 裁剪越界检测框
    #[arg(long)]
    pub clip: bool,

    /// 单批检测超时 (毫秒), 设置后检测在看门狗工作线程中运行
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// 日志级别 (trace/debug/info/warn/error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// 首选执行提供器: --trt 优先于 --cuda
    pub fn execution_provider(&self) -> OrtEP {
        if self.trt {
            OrtEP::Trt(self.device_id)
        } else if self.cuda {
            OrtEP::CUDA(self.device_id)
        } else {
            OrtEP::CPU
        }
    }

    pub fn network_spec(&self) -> Result<NetworkInputSpec> {
        NetworkInputSpec::new(self.width, self.height, self.batch, self.nc, self.max_det)
    }

    pub fn detector_config(&self) -> Result<DetectorConfig> {
        let preprocess = match &self.preprocess {
            Some(path) => Some(PreprocessConfig::from_json_file(path)?),
            None => None,
        };
        let config = DetectorConfig {
            spec: self.network_spec()?,
            thresholds: Thresholds::new(self.conf, self.iou)?,
            preprocess,
            boundary: if self.clip {
                BoundaryPolicy::Clip
            } else {
                BoundaryPolicy::Keep
            },
        };
        config.validate()?;
        Ok(config)
    }
}
