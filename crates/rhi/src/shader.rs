//! Shader module loading.
//!
//! SPIR-V binaries are compiled offline (see `shaders/`) and loaded from
//! disk at startup; there is no runtime compilation.

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Shader pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Converts to Vulkan stage flags.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// A loaded shader module with its stage and entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads a SPIR-V binary from `path`.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::Shader(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let words = Self::decode_spirv(&bytes)
            .map_err(|e| RhiError::Shader(format!("'{}': {}", path.display(), e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let entry_point = CString::new(entry_point)
            .map_err(|_| RhiError::Shader("entry point contains NUL".to_string()))?;

        debug!("Loaded shader: {} ({:?})", path.display(), stage);

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
        if bytes.len() % 4 != 0 || bytes.is_empty() {
            return Err("not a SPIR-V binary (size not a multiple of 4)".to_string());
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if words[0] != 0x0723_0203 {
            return Err("not a SPIR-V binary (bad magic)".to_string());
        }
        Ok(words)
    }

    /// Returns the Vulkan module handle.
    #[inline]
    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the stage this module is for.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Builds the pipeline stage create info for this module.
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_decode_rejects_truncated_binary() {
        assert!(Shader::decode_spirv(&[1, 2, 3]).is_err());
        assert!(Shader::decode_spirv(&[]).is_err());
    }

    #[test]
    fn test_decode_checks_magic() {
        let bad = [0u8; 8];
        assert!(Shader::decode_spirv(&bad).is_err());

        let mut good = Vec::new();
        good.extend_from_slice(&0x0723_0203u32.to_le_bytes());
        good.extend_from_slice(&0u32.to_le_bytes());
        let words = Shader::decode_spirv(&good).unwrap();
        assert_eq!(words[0], 0x0723_0203);
    }
}
