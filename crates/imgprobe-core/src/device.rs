//! Execution device selection for ONNX Runtime sessions.

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use std::fmt;

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Use CUDA when ONNX Runtime reports it usable, otherwise the CPU.
    ///
    /// With `allow_accelerator == false` the probe is skipped entirely.
    pub fn select(allow_accelerator: bool) -> Self {
        if !allow_accelerator {
            tracing::info!("accelerator probe disabled; using CPU");
            return Device::Cpu;
        }

        match CUDAExecutionProvider::default().is_available() {
            Ok(true) => {
                tracing::info!("CUDA execution provider available");
                Device::Cuda
            }
            Ok(false) => {
                tracing::info!("CUDA execution provider unavailable; using CPU");
                Device::Cpu
            }
            Err(e) => {
                tracing::warn!(error = %e, "CUDA availability probe failed; using CPU");
                Device::Cpu
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    pub(crate) fn execution_providers(&self) -> Vec<ExecutionProviderDispatch> {
        match self {
            Device::Cuda => vec![CUDAExecutionProvider::default().build()],
            Device::Cpu => vec![CPUExecutionProvider::default().build()],
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
