// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 命令行目标检测
///
/// 直接运行: cargo run --release --bin detect -- --model yolov7.onnx --trt --source a.jpg b.jpg
/// 每张图片输出一行 JSON (原图像素坐标)
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::RgbImage;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vimba_detect::{gen_time_string, Args, DetectionWorker, Detector, Frame, ObjectDetection, OwnedFrame};

/// 检测执行方式: 当前线程直接调用, 或交给带超时的工作线程
enum Runner {
    Direct(Box<dyn Detector>),
    Watchdog(DetectionWorker, Duration),
}

impl Runner {
    fn run(&mut self, images: Vec<RgbImage>) -> Result<Vec<Vec<ObjectDetection>>> {
        let results = match self {
            Runner::Direct(detector) => {
                let frames: Vec<Frame> = images.iter().map(Frame::from_rgb_image).collect();
                detector.get_detections_batch(&frames)?
            }
            Runner::Watchdog(worker, timeout) => {
                let frames = images.into_iter().map(OwnedFrame::from).collect();
                worker.detect_timeout(frames, *timeout)?
            }
        };
        Ok(results)
    }
}

fn load_image(path: &Path) -> Result<RgbImage> {
    let img = image::open(path).with_context(|| format!("无法读取图片: {}", path.display()))?;
    Ok(img.to_rgb8())
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    if args.source.is_empty() {
        bail!("至少需要一张输入图片 (--source)");
    }

    let config = args.detector_config().context("配置参数错误")?;
    let detector = args
        .backend
        .create(&config, &args.model, args.execution_provider(), args.fp16)
        .with_context(|| format!("无法创建检测器: {}", args.model))?;
    info!("检测器: {}, 输入尺寸 {:?}", detector.name(), detector.input_size());

    let mut runner = match args.timeout_ms {
        Some(ms) => Runner::Watchdog(DetectionWorker::spawn(detector, 1)?, Duration::from_millis(ms)),
        None => Runner::Direct(detector),
    };

    for paths in args.source.chunks(config.spec.batch_size) {
        let images = paths.iter().map(|p| load_image(p)).collect::<Result<Vec<_>>>()?;
        let sizes: Vec<(u32, u32)> = images.iter().map(|img| img.dimensions()).collect();

        let t = Instant::now();
        let results = match runner.run(images) {
            Ok(results) => results,
            Err(e) => {
                warn!("批次检测失败: {:#}", e);
                return Err(e);
            }
        };
        info!("批次 {} 张, 耗时 {:?}", paths.len(), t.elapsed());

        for ((path, (width, height)), detections) in paths.iter().zip(sizes).zip(results) {
            let line = json!({
                "timestamp": gen_time_string("-"),
                "source": path.display().to_string(),
                "width": width,
                "height": height,
                "detections": detections,
            });
            println!("{}", line);
        }
    }

    Ok(())
}
