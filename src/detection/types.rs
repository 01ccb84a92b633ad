// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测系统数据结构定义
// Data structures for the detection pipeline

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{DetectError, Result};

/// 输入图像通道数 (只支持三通道)
pub const FRAME_CHANNELS: usize = 3;

// ========== 枚举类型 ==========

/// 通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// 像素排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// HWC, 每个像素三个字节连续存放
    #[default]
    Interleaved,
    /// CHW, 每个通道一整块
    Planar,
}

// ========== 数据结构 ==========

/// 相机帧 (借用的像素缓冲区)
///
/// 流水线只在一次调用期间借用帧数据, 不持有所有权。
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    layout: PixelLayout,
    channel_order: ChannelOrder,
}

impl<'a> Frame<'a> {
    /// 交错排列的 RGB 帧
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            layout: PixelLayout::Interleaved,
            channel_order: ChannelOrder::Rgb,
        }
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    pub fn from_rgb_image(img: &'a RgbImage) -> Self {
        Self::new(img.as_raw(), img.width(), img.height())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    /// 检查尺寸与缓冲区长度
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectError::input(format!(
                "图像面积为零: {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * FRAME_CHANNELS;
        if self.data.len() != expected {
            return Err(DetectError::input(format!(
                "数据长度不匹配: 期望长度 {}, 实际长度 {}",
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// 读取像素的第 `channel` 个通道 (按帧自身的通道顺序)
    ///
    /// 调用前必须已通过 [`Frame::validate`]。
    #[inline]
    pub fn pixel(&self, x: usize, y: usize, channel: usize) -> u8 {
        let w = self.width as usize;
        match self.layout {
            PixelLayout::Interleaved => self.data[(y * w + x) * FRAME_CHANNELS + channel],
            PixelLayout::Planar => {
                let plane = w * self.height as usize;
                self.data[channel * plane + y * w + x]
            }
        }
    }
}

/// 持有像素数据的帧, 用于跨线程传递
#[derive(Debug, Clone)]
pub struct OwnedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    layout: PixelLayout,
    channel_order: ChannelOrder,
}

impl OwnedFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            layout: PixelLayout::Interleaved,
            channel_order: ChannelOrder::Rgb,
        }
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    pub fn as_frame(&self) -> Frame<'_> {
        Frame::new(&self.data, self.width, self.height)
            .with_layout(self.layout)
            .with_channel_order(self.channel_order)
    }
}

impl From<RgbImage> for OwnedFrame {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height)
    }
}

/// 网络空间中的原始检测 (letterbox 之后, 逆映射之前)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
        class_id: usize,
        confidence: f32,
    ) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
            class_id,
            confidence,
        }
    }

    /// (l, t, r, b)
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.center_x + self.width / 2.0,
            self.center_y + self.height / 2.0,
        )
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersection_area(&self, another: &RawDetection) -> f32 {
        let (l1, t1, r1, b1) = self.corners();
        let (l2, t2, r2, b2) = another.corners();
        let l = l1.max(l2);
        let r = r1.min(r2);
        let t = t1.max(t2);
        let b = b1.min(b2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    /// 交并比, 两框面积都为零时返回 0
    pub fn iou(&self, another: &RawDetection) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// 对外输出的检测结果 (原图像素坐标, 中心点 + 半宽高)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDetection {
    pub id: usize,
    pub center_x: f32,
    pub center_y: f32,
    pub width_half: f32,
    pub height_half: f32,
}

impl ObjectDetection {
    /// 由左上/右下角点构造
    pub fn from_corners(id: usize, l: f32, t: f32, r: f32, b: f32) -> Self {
        Self {
            id,
            center_x: (l + r) / 2.0,
            center_y: (t + b) / 2.0,
            width_half: (r - l) / 2.0,
            height_half: (b - t) / 2.0,
        }
    }

    pub fn left(&self) -> f32 {
        self.center_x - self.width_half
    }

    pub fn top(&self) -> f32 {
        self.center_y - self.height_half
    }

    pub fn right(&self) -> f32 {
        self.center_x + self.width_half
    }

    pub fn bottom(&self) -> f32 {
        self.center_y + self.height_half
    }

    /// 归一化到 [0, 1] (除以原图宽高)
    pub fn normalized(&self, source_width: u32, source_height: u32) -> Self {
        let w = source_width as f32;
        let h = source_height as f32;
        Self {
            id: self.id,
            center_x: self.center_x / w,
            center_y: self.center_y / h,
            width_half: self.width_half / w,
            height_half: self.height_half / h,
        }
    }
}
