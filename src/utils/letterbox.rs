// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// Letterbox 几何映射
// 原图 → 网络输入 (等比缩放 + 单轴对称填充), 以及网络空间 → 原图的逆映射

use super::affine_transform::AffineMatrix;
use crate::config::NetworkInputSpec;
use crate::error::{DetectError, Result};

/// 约束缩放比例的轴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongAxis {
    /// 宽度约束 (图像相对更宽), 上下填充
    Width,
    /// 高度约束, 左右填充
    Height,
}

/// 单张图像的 letterbox 变换
///
/// 每帧重新计算, 不跨帧缓存 (相邻帧尺寸可能不同)。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub long_axis: LongAxis,
}

impl LetterboxTransform {
    /// 计算 `source` → `input` 的变换
    ///
    /// `r_w = input_w / source_w`, `r_h = input_h / source_h`。
    /// 若 `r_h > r_w` 则宽度约束: `scale = r_w`, 上下各填充 `(input_h - r_w * source_h) / 2`;
    /// 否则高度约束: `scale = r_h`, 左右各填充 `(input_w - r_h * source_w) / 2`。
    pub fn new(
        source_width: u32,
        source_height: u32,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self> {
        if source_width == 0 || source_height == 0 {
            return Err(DetectError::input(format!(
                "图像面积为零: {}x{}",
                source_width, source_height
            )));
        }
        if input_width == 0 || input_height == 0 {
            return Err(DetectError::configuration(format!(
                "网络输入尺寸非法: {}x{}",
                input_width, input_height
            )));
        }

        let (sw, sh) = (source_width as f32, source_height as f32);
        let (iw, ih) = (input_width as f32, input_height as f32);
        let r_w = iw / sw;
        let r_h = ih / sh;

        // 用整数交叉相乘比较宽高比, 避免浮点误差把等比例判成不等
        let lhs = input_height as u64 * source_width as u64;
        let rhs = input_width as u64 * source_height as u64;

        let transform = if lhs > rhs {
            // r_h > r_w
            Self {
                scale: r_w,
                pad_x: 0.0,
                pad_y: ((ih - r_w * sh) / 2.0).max(0.0),
                long_axis: LongAxis::Width,
            }
        } else if lhs < rhs {
            Self {
                scale: r_h,
                pad_x: ((iw - r_h * sw) / 2.0).max(0.0),
                pad_y: 0.0,
                long_axis: LongAxis::Height,
            }
        } else {
            // 宽高比完全相同, 无填充
            Self {
                scale: r_h,
                pad_x: 0.0,
                pad_y: 0.0,
                long_axis: LongAxis::Height,
            }
        };

        Ok(transform)
    }

    pub fn from_spec(
        source_width: u32,
        source_height: u32,
        spec: &NetworkInputSpec,
    ) -> Result<Self> {
        Self::new(source_width, source_height, spec.input_width, spec.input_height)
    }

    /// 原图 → 网络空间
    #[inline]
    pub fn forward(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }

    /// 网络空间 → 原图
    #[inline]
    pub fn inverse(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    /// 对角点 (l, t, r, b) 做逆映射
    pub fn inverse_corners(&self, l: f32, t: f32, r: f32, b: f32) -> (f32, f32, f32, f32) {
        let (l, t) = self.inverse(l, t);
        let (r, b) = self.inverse(r, b);
        (l, t, r, b)
    }

    /// 正向映射对应的仿射矩阵 (供预处理反向采样使用)
    pub fn to_affine(&self) -> AffineMatrix {
        AffineMatrix::translation(self.pad_x, self.pad_y)
            .compose(&AffineMatrix::scale(self.scale, self.scale))
    }
}
