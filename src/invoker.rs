// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 推理调用接口
// 流水线只通过这个 trait 访问推理引擎, 测试时注入固定输出的桩实现

use ndarray::ArrayView4;

use crate::error::{DetectError, Result};

/// 推理引擎调用
///
/// `input` 为 NCHW 输入张量, `output` 为预先分配好的输出缓冲区,
/// 长度固定为 `batch * max_det * (5 + nc)`。调用是同步的。
pub trait InferenceInvoker: Send {
    fn infer(&mut self, input: ArrayView4<'_, f32>, output: &mut [f32]) -> Result<()>;

    fn name(&self) -> &str;
}

impl<T: InferenceInvoker + ?Sized> InferenceInvoker for Box<T> {
    fn infer(&mut self, input: ArrayView4<'_, f32>, output: &mut [f32]) -> Result<()> {
        (**self).infer(input, output)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// 固定输出的推理桩, 每次调用都把同一份缓冲区拷贝到输出
#[derive(Debug, Clone)]
pub struct FixedOutputInvoker {
    output: Vec<f32>,
    calls: usize,
}

impl FixedOutputInvoker {
    pub fn new(output: Vec<f32>) -> Self {
        Self { output, calls: 0 }
    }

    /// 已调用次数
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl InferenceInvoker for FixedOutputInvoker {
    fn infer(&mut self, _input: ArrayView4<'_, f32>, output: &mut [f32]) -> Result<()> {
        if output.len() != self.output.len() {
            return Err(DetectError::invoker(format!(
                "输出长度不匹配: 期望 {}, 实际 {}",
                output.len(),
                self.output.len()
            )));
        }
        output.copy_from_slice(&self.output);
        self.calls += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_fixed_output_copies_buffer() {
        let input = Array4::<f32>::zeros((1, 3, 2, 2));
        let mut invoker = FixedOutputInvoker::new(vec![1.0, 2.0, 3.0]);
        let mut out = vec![0.0; 3];
        invoker.infer(input.view(), &mut out).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
        assert_eq!(invoker.calls(), 1);
    }

    #[test]
    fn test_fixed_output_length_mismatch() {
        let input = Array4::<f32>::zeros((1, 3, 2, 2));
        let mut invoker: Box<dyn InferenceInvoker> =
            Box::new(FixedOutputInvoker::new(vec![1.0, 2.0]));
        let mut out = vec![0.0; 3];
        let err = invoker.infer(input.view(), &mut out).unwrap_err();
        assert!(err.is_invoker_failure());
        assert_eq!(invoker.name(), "fixed");
    }
}
