// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测工作线程: 在独立线程上运行检测器, 调用方通过有界队列提交任务并限时等待结果
//
// 超时视为推理失败: 工作线程连同其检测器和缓冲区一起被废弃, 不再复用。

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use super::types::{ObjectDetection, OwnedFrame};
use crate::error::{DetectError, Result};
use crate::models::Detector;

type BatchResult = Result<Vec<Vec<ObjectDetection>>>;

struct Job {
    frames: Vec<OwnedFrame>,
    reply: Sender<BatchResult>,
}

pub struct DetectionWorker {
    name: String,
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    abandoned: bool,
}

impl DetectionWorker {
    /// 启动工作线程, `queue_depth` 为待处理任务队列长度
    pub fn spawn(detector: Box<dyn Detector>, queue_depth: usize) -> Result<Self> {
        let name = format!("detect-{}", detector.name());
        let (tx, rx) = crossbeam_channel::bounded::<Job>(queue_depth.max(1));

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(detector, rx))
            .map_err(|e| DetectError::configuration(format!("无法启动检测线程: {}", e)))?;

        info!("{} 工作线程已启动", name);
        Ok(Self {
            name,
            tx: Some(tx),
            handle: Some(handle),
            abandoned: false,
        })
    }

    fn run(mut detector: Box<dyn Detector>, rx: Receiver<Job>) {
        while let Ok(job) = rx.recv() {
            let frames: Vec<_> = job.frames.iter().map(OwnedFrame::as_frame).collect();
            let result = detector.get_detections_batch(&frames);
            if let Err(e) = &result {
                error!("{} 检测失败: {}", detector.name(), e);
            }
            // 调用方已超时放弃时, 接收端已关闭
            let _ = job.reply.send(result);
        }
        debug!("{} 任务队列关闭, 线程退出", detector.name());
    }

    /// 提交一批帧并在 `timeout` 内等待结果
    ///
    /// 超时或线程异常退出时返回 [`DetectError::Invoker`], 此后该实例不可再用。
    pub fn detect_timeout(&mut self, frames: Vec<OwnedFrame>, timeout: Duration) -> BatchResult {
        let tx = match (&self.tx, self.abandoned) {
            (Some(tx), false) => tx,
            _ => return Err(DetectError::invoker(format!("{} 已废弃", self.name))),
        };

        let start = Instant::now();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let job = Job {
            frames,
            reply: reply_tx,
        };
        match tx.send_timeout(job, timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                return Err(self.abandon("任务队列已满, 提交超时"));
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(self.abandon("工作线程已退出"));
            }
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        match reply_rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(self.abandon(&format!("检测超时 ({:?})", timeout))),
            Err(RecvTimeoutError::Disconnected) => Err(self.abandon("工作线程异常退出")),
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    fn abandon(&mut self, reason: &str) -> DetectError {
        warn!("{}: {}, 废弃该检测器", self.name, reason);
        self.abandoned = true;
        self.tx = None;
        DetectError::invoker(format!("{}: {}", self.name, reason))
    }
}

impl Drop for DetectionWorker {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if self.abandoned {
                // 可能仍阻塞在推理调用中, 不等待
                debug!("{} 分离工作线程", self.name);
            } else if handle.join().is_err() {
                error!("{} 工作线程 panic", self.name);
            }
        }
        info!("{} 销毁完成", self.name);
    }
}
