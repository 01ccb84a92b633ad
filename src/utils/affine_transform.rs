// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 轴对齐仿射映射与反向采样 (letterbox 预处理用)
// 目标像素中心经逆映射落到原图, 在原图上插值; 落在原图外的填常数

use crate::config::Interpolation;
use crate::detection::Frame;

/// 轴对齐仿射映射: `(x, y) -> (sx * x + tx, sy * y + ty)`
///
/// letterbox 只有等比缩放和平移, 不需要旋转/剪切分量。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl AffineMatrix {
    pub const IDENTITY: Self = Self {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            tx: dx,
            ty: dy,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            sx,
            sy,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.sx * x + self.tx, self.sy * y + self.ty)
    }

    /// 逆映射, 任一轴缩放为零 (或非有限值) 时不可逆
    pub fn inverse(&self) -> Option<Self> {
        let usable = |s: f32| s.is_finite() && s != 0.0;
        if !usable(self.sx) || !usable(self.sy) {
            return None;
        }
        Some(Self {
            sx: 1.0 / self.sx,
            sy: 1.0 / self.sy,
            tx: -self.tx / self.sx,
            ty: -self.ty / self.sy,
        })
    }

    /// 组合 `self ∘ other`: 先应用 `other`, 再应用 `self`
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            sx: self.sx * other.sx,
            sy: self.sy * other.sy,
            tx: self.sx * other.tx + self.tx,
            ty: self.sy * other.ty + self.ty,
        }
    }
}

/// 在源图坐标 (x, y) 处采样第 `channel` 个通道
///
/// 坐标使用像素中心约定 (像素 i 覆盖 [i, i+1), 中心 i + 0.5)。
/// 落在原图之外时返回 None, 由调用者填充常数。
#[inline]
pub fn sample(
    frame: &Frame<'_>,
    x: f32,
    y: f32,
    channel: usize,
    interpolation: Interpolation,
) -> Option<f32> {
    let width = frame.width() as f32;
    let height = frame.height() as f32;
    if x < 0.0 || y < 0.0 || x >= width || y >= height {
        return None;
    }

    match interpolation {
        Interpolation::Nearest => Some(get_pixel_nearest(frame, x, y, channel)),
        Interpolation::Bilinear => Some(get_pixel_bilinear(frame, x, y, channel)),
    }
}

/// 最近邻插值
fn get_pixel_nearest(frame: &Frame<'_>, x: f32, y: f32, channel: usize) -> f32 {
    let ix = (x.floor() as usize).min(frame.width() as usize - 1);
    let iy = (y.floor() as usize).min(frame.height() as usize - 1);
    frame.pixel(ix, iy, channel) as f32
}

/// 双线性插值, 邻域越界时取最近的边缘像素
fn get_pixel_bilinear(frame: &Frame<'_>, x: f32, y: f32, channel: usize) -> f32 {
    // 像素 i 的中心在 i + 0.5
    let (gx, gy) = (x - 0.5, y - 0.5);
    let (left, top) = (gx.floor(), gy.floor());
    let (wx, wy) = (gx - left, gy - top);

    let at = |dx: i32, dy: i32| -> f32 {
        let px = (left as i32 + dx).clamp(0, frame.width() as i32 - 1) as usize;
        let py = (top as i32 + dy).clamp(0, frame.height() as i32 - 1) as usize;
        frame.pixel(px, py, channel) as f32
    };

    let upper = at(0, 0) + (at(1, 0) - at(0, 0)) * wx;
    let lower = at(0, 1) + (at(1, 1) - at(0, 1)) * wx;
    (upper + (lower - upper) * wy).clamp(0.0, 255.0)
}
