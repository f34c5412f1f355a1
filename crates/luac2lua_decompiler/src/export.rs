use std::path::Path;

use anyhow::{Context, Result};
use luadec_core::{BytecodeImage, Header, Prototype, Warning};
use serde::Serialize;

/// What `--yaml` writes next to each decompiled script.
#[derive(Debug, Serialize)]
pub struct ChunkMetadata<'a> {
    pub header: &'a Header,
    pub warnings: Vec<String>,
    pub main: FunctionMetadata<'a>,
}

#[derive(Debug, Serialize)]
pub struct FunctionMetadata<'a> {
    pub path: String,
    pub source: &'a str,
    pub line_defined: i64,
    pub params: u8,
    pub is_vararg: bool,
    pub max_stack: u8,
    pub instructions: usize,
    pub constants: Vec<String>,
    pub locals: Vec<&'a str>,
    pub upvalues: &'a [String],
    pub functions: Vec<FunctionMetadata<'a>>,
}

impl<'a> FunctionMetadata<'a> {
    fn new(proto: &'a Prototype, path: String) -> Self {
        let functions = proto
            .prototypes
            .iter()
            .enumerate()
            .map(|(i, child)| FunctionMetadata::new(child, format!("{}/{}", path, i)))
            .collect();
        Self {
            path,
            source: &proto.source,
            line_defined: proto.line_defined,
            params: proto.param_count,
            is_vararg: proto.has_varargs(),
            max_stack: proto.max_stack,
            instructions: proto.code.len(),
            constants: proto.constants.iter().map(|k| k.to_string()).collect(),
            locals: proto.locals.iter().map(|l| l.name.as_str()).collect(),
            upvalues: &proto.upvalues,
            functions,
        }
    }
}

impl<'a> ChunkMetadata<'a> {
    pub fn new(image: &'a BytecodeImage, warnings: &[Warning]) -> Self {
        Self {
            header: &image.header,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
            main: FunctionMetadata::new(&image.main, "main".to_string()),
        }
    }

    pub fn export_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let s = serde_yml::to_string(self)?;
        std::fs::write(path, s).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
