//! Compiles `.proto` sources into the descriptor tree layout

use crate::error::{GatewayError, GatewayResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Runs `protoc` to produce `OUT/<stem>/<stem>_pb_grpc.binpb` per source file,
/// with imports and source comments included.
#[derive(Debug, Clone)]
pub struct ProtoCompiler {
    out_dir: PathBuf,
    includes: Vec<PathBuf>,
    protoc: Option<PathBuf>,
}

impl ProtoCompiler {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            includes: Vec::new(),
            protoc: None,
        }
    }

    /// Add an import search path
    pub fn include(mut self, dir: impl Into<PathBuf>) -> Self {
        self.includes.push(dir.into());
        self
    }

    /// Use this `protoc` instead of the vendored binary
    pub fn protoc(mut self, path: impl Into<PathBuf>) -> Self {
        self.protoc = Some(path.into());
        self
    }

    /// Compile every source, stopping at the first failure
    pub fn compile_all<P: AsRef<Path>>(&self, protos: &[P]) -> GatewayResult<Vec<PathBuf>> {
        let outputs = protos
            .iter()
            .map(|proto| self.compile(proto.as_ref()))
            .collect::<GatewayResult<Vec<_>>>()?;
        info!(files = outputs.len(), out_dir = %self.out_dir.display(), "Compiled descriptors");
        Ok(outputs)
    }

    /// Compile one source and return the descriptor set path
    pub fn compile(&self, proto: &Path) -> GatewayResult<PathBuf> {
        let stem = proto
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| GatewayError::Protoc(format!("not a file: {}", proto.display())))?;
        let proto = fs::canonicalize(proto)
            .map_err(|e| GatewayError::Protoc(format!("{}: {}", proto.display(), e)))?;

        let dir = self.out_dir.join(&stem);
        fs::create_dir_all(&dir)
            .map_err(|e| GatewayError::Protoc(format!("{}: {}", dir.display(), e)))?;
        let out = dir.join(format!("{}_pb_grpc.binpb", stem));

        let mut command = Command::new(self.protoc_path()?);
        for include in self.include_paths(&proto)? {
            command.arg(format!("-I{}", include.display()));
        }
        command
            .arg("--include_imports")
            .arg("--include_source_info")
            .arg(format!("--descriptor_set_out={}", out.display()))
            .arg(&proto);

        debug!(command = ?command, "Running protoc");
        let output = command
            .output()
            .map_err(|e| GatewayError::Protoc(format!("failed to run protoc: {}", e)))?;
        if !output.status.success() {
            return Err(GatewayError::Protoc(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        debug!(source = %proto.display(), output = %out.display(), "Compiled proto");
        Ok(out)
    }

    fn protoc_path(&self) -> GatewayResult<PathBuf> {
        match &self.protoc {
            Some(path) => Ok(path.clone()),
            None => protoc_bin_vendored::protoc_bin_path()
                .map_err(|e| GatewayError::Protoc(format!("no vendored protoc: {}", e))),
        }
    }

    /// Configured includes, the source's own directory when no include
    /// contains it, and the well-known types last
    fn include_paths(&self, proto: &Path) -> GatewayResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.includes.len() + 2);
        for include in &self.includes {
            let include = fs::canonicalize(include)
                .map_err(|e| GatewayError::Protoc(format!("{}: {}", include.display(), e)))?;
            paths.push(include);
        }

        if !paths.iter().any(|include| proto.starts_with(include)) {
            if let Some(parent) = proto.parent() {
                paths.push(parent.to_path_buf());
            }
        }

        if let Ok(well_known) = protoc_bin_vendored::include_path() {
            paths.push(well_known);
        }
        Ok(paths)
    }
}
