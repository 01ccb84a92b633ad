// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测结果组装: 网络空间 -> 原图像素空间

use crate::config::BoundaryPolicy;
use crate::detection::{ObjectDetection, RawDetection};
use crate::utils::LetterboxTransform;

/// 把一张图 NMS 后的检测逆映射回原图, 保持输入顺序
///
/// `transform` 必须由这张图自己的尺寸计算得到。
pub fn assemble(
    kept: &[RawDetection],
    transform: &LetterboxTransform,
    boundary: BoundaryPolicy,
    source_width: u32,
    source_height: u32,
) -> Vec<ObjectDetection> {
    let (w, h) = (source_width as f32, source_height as f32);
    kept.iter()
        .map(|det| {
            let (l, t, r, b) = det.corners();
            let (mut l, mut t, mut r, mut b) = transform.inverse_corners(l, t, r, b);
            if boundary == BoundaryPolicy::Clip {
                l = l.clamp(0.0, w);
                r = r.clamp(0.0, w);
                t = t.clamp(0.0, h);
                b = b.clamp(0.0, h);
            }
            ObjectDetection::from_corners(det.class_id, l, t, r, b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_back_to_source() {
        let t = LetterboxTransform::new(1280, 720, 640, 640).unwrap();
        let kept = [RawDetection::new(320.0, 300.0, 100.0, 100.0, 7, 0.9)];
        let out = assemble(&kept, &t, BoundaryPolicy::Keep, 1280, 720);
        assert_eq!(out.len(), 1);
        let d = out[0];
        assert_eq!(d.id, 7);
        assert!((d.center_x - 640.0).abs() < 1e-4);
        assert!((d.center_y - 320.0).abs() < 1e-4);
        assert!((d.width_half - 100.0).abs() < 1e-4);
        assert!((d.height_half - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_boundary_policy() {
        let t = LetterboxTransform::new(1280, 720, 640, 640).unwrap();
        // 框延伸进上方填充区: 网络空间 t = 120 -> 原图 y = -40
        let kept = [RawDetection::new(20.0, 160.0, 60.0, 80.0, 0, 0.9)];

        let keep = assemble(&kept, &t, BoundaryPolicy::Keep, 1280, 720);
        assert!((keep[0].top() + 40.0).abs() < 1e-3);
        assert!((keep[0].left() + 20.0).abs() < 1e-3);

        let clip = assemble(&kept, &t, BoundaryPolicy::Clip, 1280, 720);
        assert_eq!(clip[0].top(), 0.0);
        assert_eq!(clip[0].left(), 0.0);
        assert!((clip[0].bottom() - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_preserves_order_and_empty() {
        let t = LetterboxTransform::new(640, 640, 640, 640).unwrap();
        let kept = [
            RawDetection::new(10.0, 10.0, 4.0, 4.0, 2, 0.9),
            RawDetection::new(100.0, 10.0, 4.0, 4.0, 1, 0.8),
        ];
        let out = assemble(&kept, &t, BoundaryPolicy::Keep, 640, 640);
        assert_eq!(out.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(assemble(&[], &t, BoundaryPolicy::Keep, 640, 640).is_empty());
    }
}
