// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 推理后端
// 执行提供器按顺序注册, 不可用时 ONNX Runtime 自动回退到下一个

use ndarray::ArrayView4;
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info};

use crate::config::NetworkInputSpec;
use crate::error::{DetectError, Result};
use crate::invoker::InferenceInvoker;

/// TensorRT 默认工作区 (1 GiB)
const TRT_MAX_WORKSPACE: usize = 1 << 30;

/// 执行提供器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
    Trt(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    /// 模型文件路径
    pub f: String,
    pub ep: OrtEP,
    pub trt_fp16: bool,
    pub spec: NetworkInputSpec,
}

impl OrtConfig {
    pub fn new(f: impl Into<String>, ep: OrtEP, spec: NetworkInputSpec) -> Self {
        Self {
            f: f.into(),
            ep,
            trt_fp16: false,
            spec,
        }
    }

    /// 注册顺序: TensorRT -> CUDA -> CPU
    fn execution_providers(&self) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();
        match self.ep {
            OrtEP::Trt(device_id) => {
                providers.push(
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .with_fp16(self.trt_fp16)
                        .with_max_workspace_size(TRT_MAX_WORKSPACE)
                        .build(),
                );
                providers.push(
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                );
            }
            OrtEP::CUDA(device_id) => {
                providers.push(
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                );
            }
            OrtEP::CPU => {}
        }
        providers.push(CPUExecutionProvider::default().build());
        providers
    }
}

/// 基于 ONNX Runtime 会话的推理调用
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_name: String,
    label: String,
}

impl OrtBackend {
    pub fn build(config: OrtConfig) -> Result<Self> {
        config.spec.validate()?;
        info!("加载模型: {} ({:?})", config.f, config.ep);

        let model_load = |e: ort::Error| DetectError::ModelLoad {
            path: config.f.clone(),
            message: e.to_string(),
        };
        let session = Session::builder()
            .map_err(model_load)?
            .with_execution_providers(config.execution_providers())
            .map_err(model_load)?
            .commit_from_file(&config.f)
            .map_err(model_load)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| DetectError::ModelLoad {
                path: config.f.clone(),
                message: "模型没有输入".to_string(),
            })?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DetectError::ModelLoad {
                path: config.f.clone(),
                message: "模型没有输出".to_string(),
            })?;

        debug!("模型输入: {}, 输出: {}", input_name, output_name);

        Ok(Self {
            session,
            input_name,
            output_name,
            label: format!("ort:{:?}", config.ep),
        })
    }
}

impl InferenceInvoker for OrtBackend {
    fn infer(&mut self, input: ArrayView4<'_, f32>, output: &mut [f32]) -> Result<()> {
        let tensor = TensorRef::from_array_view(input)
            .map_err(|e| DetectError::invoker(format!("输入张量转换失败: {}", e)))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])?;

        let (shape, data) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        if data.len() != output.len() {
            return Err(DetectError::invoker(format!(
                "输出长度不匹配: 期望 {}, 实际 {} (形状 {:?})",
                output.len(),
                data.len(),
                shape
            )));
        }
        output.copy_from_slice(data);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NetworkInputSpec {
        NetworkInputSpec::new(640, 640, 1, 80, 1000).unwrap()
    }

    #[test]
    fn test_provider_order() {
        let cfg = OrtConfig::new("model.onnx", OrtEP::Trt(0), spec());
        assert_eq!(cfg.execution_providers().len(), 3);
        let cfg = OrtConfig::new("model.onnx", OrtEP::CUDA(1), spec());
        assert_eq!(cfg.execution_providers().len(), 2);
        let cfg = OrtConfig::new("model.onnx", OrtEP::CPU, spec());
        assert_eq!(cfg.execution_providers().len(), 1);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let cfg = OrtConfig::new("/nonexistent/model.onnx", OrtEP::CPU, spec());
        match OrtBackend::build(cfg) {
            Err(DetectError::ModelLoad { path, .. }) => {
                assert_eq!(path, "/nonexistent/model.onnx")
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("model should not load"),
        }
    }
}
