// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 批量预处理: letterbox 缩放 + 填充 + 归一化, 写入 NCHW 输入张量

use ndarray::{s, Array4, ArrayViewMut3};
use tracing::trace;

use crate::config::{NetworkInputSpec, PreprocessConfig};
use crate::detection::{ChannelOrder, Frame, FRAME_CHANNELS};
use crate::error::{DetectError, Result};
use crate::utils::affine_transform::{sample, AffineMatrix};
use crate::utils::LetterboxTransform;

/// 批量预处理器
///
/// 只负责写入调用者提供的输入张量, 自身不分配每帧缓冲区。
#[derive(Debug, Clone)]
pub struct BatchPreprocessor {
    config: PreprocessConfig,
}

impl BatchPreprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// 归一化之后的填充值 (按通道)
    fn normalized_pad(&self, channel: usize) -> f32 {
        self.config
            .normalization
            .apply(self.config.pad_value, channel)
    }

    /// 把一批帧写入 `input` 的前 `frames.len()` 个槽位, 返回每帧的变换
    ///
    /// 先校验全部帧再写入, 校验失败时 `input` 保持不变。
    /// 未使用的槽位填充为填充值。
    pub fn fill_batch(
        &self,
        input: &mut Array4<f32>,
        frames: &[Frame<'_>],
        spec: &NetworkInputSpec,
    ) -> Result<Vec<LetterboxTransform>> {
        if frames.len() > spec.batch_size {
            return Err(DetectError::configuration(format!(
                "批量大小 {} 超过网络上限 {}",
                frames.len(),
                spec.batch_size
            )));
        }
        if input.dim() != spec.input_shape() {
            return Err(DetectError::configuration(format!(
                "输入张量形状不匹配: 期望 {:?}, 实际 {:?}",
                spec.input_shape(),
                input.dim()
            )));
        }

        let mut transforms = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            frame
                .validate()
                .map_err(|e| DetectError::input(format!("第 {} 帧: {}", i, e)))?;
            transforms.push(LetterboxTransform::from_spec(
                frame.width(),
                frame.height(),
                spec,
            )?);
        }

        for (i, (frame, transform)) in frames.iter().zip(&transforms).enumerate() {
            let slot = input.slice_mut(s![i, .., .., ..]);
            self.warp_into(slot, frame, transform)?;
            trace!(
                "第 {} 帧 {}x{}: scale={:.4}, pad=({:.1}, {:.1})",
                i,
                frame.width(),
                frame.height(),
                transform.scale,
                transform.pad_x,
                transform.pad_y
            );
        }

        for i in frames.len()..spec.batch_size {
            let mut slot = input.slice_mut(s![i, .., .., ..]);
            for c in 0..FRAME_CHANNELS {
                slot.slice_mut(s![c, .., ..]).fill(self.normalized_pad(c));
            }
        }

        Ok(transforms)
    }

    /// 反向映射: 对每个目标像素中心求其在原图中的位置并采样
    fn warp_into(
        &self,
        mut slot: ArrayViewMut3<'_, f32>,
        frame: &Frame<'_>,
        transform: &LetterboxTransform,
    ) -> Result<()> {
        let inverse: AffineMatrix = transform
            .to_affine()
            .inverse()
            .ok_or_else(|| DetectError::input("letterbox 变换不可逆"))?;

        let swap = needs_channel_swap(frame.channel_order(), self.config.channel_order);
        let pads: [f32; FRAME_CHANNELS] = [
            self.normalized_pad(0),
            self.normalized_pad(1),
            self.normalized_pad(2),
        ];
        let (_, height, width) = slot.dim();

        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = inverse.transform_point(x as f32 + 0.5, y as f32 + 0.5);
                for (c, pad) in pads.iter().enumerate() {
                    let src_channel = if swap { FRAME_CHANNELS - 1 - c } else { c };
                    slot[[c, y, x]] =
                        match sample(frame, sx, sy, src_channel, self.config.interpolation) {
                            Some(v) => self.config.normalization.apply(v, c),
                            None => *pad,
                        };
                }
            }
        }
        Ok(())
    }
}

impl Default for BatchPreprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}

/// 帧自身通道顺序相对模型顺序是否需要交换
pub fn needs_channel_swap(frame: ChannelOrder, model: ChannelOrder) -> bool {
    frame != model
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Interpolation, Normalization};

    fn spec(w: u32, h: u32, batch: usize) -> NetworkInputSpec {
        NetworkInputSpec::new(w, h, batch, 2, 10).unwrap()
    }

    fn alloc(spec: &NetworkInputSpec) -> Array4<f32> {
        Array4::zeros(spec.input_shape())
    }

    #[test]
    fn test_wide_image_pads_top_and_bottom() {
        let spec = spec(64, 64, 1);
        let mut input = alloc(&spec);
        // 128x72 -> scale 0.5, pad_y = 14
        let data = vec![200u8; 128 * 72 * 3];
        let pre = BatchPreprocessor::default();
        let transforms = pre
            .fill_batch(&mut input, &[Frame::new(&data, 128, 72)], &spec)
            .unwrap();
        assert_eq!(transforms[0].pad_y, 14.0);

        let pad = 128.0 / 255.0;
        let img = 200.0 / 255.0;
        for c in 0..3 {
            for x in [0usize, 31, 63] {
                assert!((input[[0, c, 0, x]] - pad).abs() < 1e-6);
                assert!((input[[0, c, 13, x]] - pad).abs() < 1e-6);
                assert!((input[[0, c, 14, x]] - img).abs() < 1e-6);
                assert!((input[[0, c, 49, x]] - img).abs() < 1e-6);
                assert!((input[[0, c, 50, x]] - pad).abs() < 1e-6);
                assert!((input[[0, c, 63, x]] - pad).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_bgr_frame_is_swapped() {
        let spec = spec(8, 8, 1);
        let mut input = alloc(&spec);
        let data: Vec<u8> = std::iter::repeat([10u8, 20, 30])
            .take(8 * 8)
            .flatten()
            .collect();
        let frame = Frame::new(&data, 8, 8).with_channel_order(ChannelOrder::Bgr);
        BatchPreprocessor::default()
            .fill_batch(&mut input, &[frame], &spec)
            .unwrap();
        assert!((input[[0, 0, 4, 4]] - 30.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 1, 4, 4]] - 20.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 2, 4, 4]] - 10.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_std_and_unused_slots() {
        let spec = spec(4, 4, 3);
        let mut input = alloc(&spec);
        let config = PreprocessConfig {
            pad_value: 0.0,
            normalization: Normalization::MeanStd {
                mean: [0.5, 0.5, 0.5],
                std: [0.5, 0.5, 0.5],
            },
            channel_order: ChannelOrder::Rgb,
            interpolation: Interpolation::Nearest,
        };
        let data = vec![255u8; 4 * 4 * 3];
        BatchPreprocessor::new(config)
            .unwrap()
            .fill_batch(&mut input, &[Frame::new(&data, 4, 4)], &spec)
            .unwrap();
        // (1 - 0.5) / 0.5
        assert!((input[[0, 1, 2, 2]] - 1.0).abs() < 1e-6);
        // 未使用槽位为归一化后的填充值 (0 - 0.5) / 0.5
        assert!(input
            .slice(s![1..3, .., .., ..])
            .iter()
            .all(|v| (*v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_batch_size_errors() {
        let spec = spec(4, 4, 1);
        let mut input = alloc(&spec);
        let data = vec![0u8; 4 * 4 * 3];
        let pre = BatchPreprocessor::default();
        let frames = [Frame::new(&data, 4, 4), Frame::new(&data, 4, 4)];
        assert!(matches!(
            pre.fill_batch(&mut input, &frames, &spec),
            Err(DetectError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_frame_leaves_buffer_untouched() {
        let spec = spec(4, 4, 2);
        let mut input = Array4::from_elem(spec.input_shape(), -7.0f32);
        let good = vec![0u8; 4 * 4 * 3];
        let bad = vec![0u8; 5];
        let frames = [Frame::new(&good, 4, 4), Frame::new(&bad, 4, 4)];
        let err = BatchPreprocessor::default()
            .fill_batch(&mut input, &frames, &spec)
            .unwrap_err();
        assert!(matches!(err, DetectError::Input(_)));
        assert!(input.iter().all(|v| *v == -7.0));
    }

    #[test]
    fn test_swap_helper() {
        assert!(needs_channel_swap(ChannelOrder::Bgr, ChannelOrder::Rgb));
        assert!(!needs_channel_swap(ChannelOrder::Rgb, ChannelOrder::Rgb));
    }
}
