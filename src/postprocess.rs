// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 后处理: 解码原始输出 + 置信度过滤 + 按类别 NMS
//
// 每张图的输出为 max_det 行, 每行 [cx, cy, w, h, obj, cls_0 .. cls_{nc-1}]

use tracing::trace;

use crate::config::{NetworkInputSpec, Thresholds};
use crate::detection::RawDetection;
use crate::error::{DetectError, Result};

const CXYWH_OFFSET: usize = 4;

/// 输出框坐标的单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxUnits {
    /// 网络输入像素
    #[default]
    Pixels,
    /// 相对网络输入宽高归一化到 [0, 1]
    Normalized,
}

/// 解码单张图的输出行, 丢弃 `confidence < conf_thresh` 的行
///
/// 框坐标非有限值或宽高为负的行同样丢弃。
/// `confidence = obj * max(cls)`, 类别取最大分数 (并列时取靠前的类别)。
pub fn decode(
    rows: &[f32],
    spec: &NetworkInputSpec,
    conf_thresh: f32,
    units: BoxUnits,
) -> Result<Vec<RawDetection>> {
    if rows.len() != spec.output_len_per_image() {
        return Err(DetectError::invoker(format!(
            "单张图输出长度不匹配: 期望 {}, 实际 {}",
            spec.output_len_per_image(),
            rows.len()
        )));
    }

    let (sx, sy) = match units {
        BoxUnits::Pixels => (1.0, 1.0),
        BoxUnits::Normalized => (spec.input_width as f32, spec.input_height as f32),
    };

    let mut dets = Vec::new();
    for row in rows.chunks_exact(spec.row_len()) {
        let obj = row[CXYWH_OFFSET];
        let clss = &row[CXYWH_OFFSET + 1..];
        let Some((id, &score)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        let confidence = obj * score;
        if confidence.is_nan() || confidence < conf_thresh {
            continue;
        }

        let (cx, cy, w, h) = (row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy);
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w < 0.0 || h < 0.0 {
            continue;
        }

        dets.push(RawDetection::new(cx, cy, w, h, id, confidence));
    }
    Ok(dets)
}

/// 按类别的非极大值抑制
///
/// 先按置信度降序稳定排序 (置信度相同则保持原顺序), 依次保留未被抑制的框,
/// 并抑制其后同类别且 IoU 大于 `nms_thresh` 的框。
/// 输出顺序: 置信度降序, 相同置信度按原顺序。
pub fn non_max_suppression(dets: &[RawDetection], nms_thresh: f32) -> Vec<RawDetection> {
    let mut order: Vec<usize> = (0..dets.len()).collect();
    order.sort_by(|&a, &b| dets[b].confidence.total_cmp(&dets[a].confidence));

    let mut suppressed = vec![false; dets.len()];
    let mut keep = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i]);
        for &j in &order[pos + 1..] {
            if !suppressed[j]
                && dets[j].class_id == dets[i].class_id
                && dets[i].iou(&dets[j]) > nms_thresh
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}

/// 解码 + NMS
#[derive(Debug, Clone)]
pub struct Postprocessor {
    spec: NetworkInputSpec,
    thresholds: Thresholds,
    units: BoxUnits,
}

impl Postprocessor {
    pub fn new(spec: NetworkInputSpec, thresholds: Thresholds, units: BoxUnits) -> Self {
        Self {
            spec,
            thresholds,
            units,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// 处理单张图的输出切片
    pub fn process(&self, rows: &[f32]) -> Result<Vec<RawDetection>> {
        let candidates = decode(rows, &self.spec, self.thresholds.conf, self.units)?;
        let kept = non_max_suppression(&candidates, self.thresholds.nms);
        trace!("候选 {} 个, NMS 后保留 {} 个", candidates.len(), kept.len());
        Ok(kept)
    }

    /// 处理整个输出缓冲区的前 `count` 张图
    pub fn process_batch(&self, output: &[f32], count: usize) -> Result<Vec<Vec<RawDetection>>> {
        if count > self.spec.batch_size || output.len() != self.spec.output_len() {
            return Err(DetectError::invoker(format!(
                "输出缓冲区长度 {} 与批量 {} 不匹配",
                output.len(),
                count
            )));
        }
        output
            .chunks_exact(self.spec.output_len_per_image())
            .take(count)
            .map(|rows| self.process(rows))
            .collect()
    }
}
