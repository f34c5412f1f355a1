//! Many scripts in one go, where a bad script never takes its siblings down.

use crate::emit::{render_prototype, Decompiled, RenderOptions};
use crate::error::DecodeError;
use crate::format::{load_with, BytecodeImage, LoadOptions};

/// A successfully decoded script together with its rendering.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub image: BytecodeImage,
    pub output: Decompiled,
}

pub fn decode(bytes: &[u8], load: &LoadOptions, render: &RenderOptions) -> crate::error::Result<Decoded> {
    let image = load_with(bytes, load)?;
    let output = render_prototype(&image.main, render)?;
    Ok(Decoded { image, output })
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub decoded: Vec<(String, Decoded)>,
    pub skipped: Vec<(String, DecodeError)>,
}

impl BatchReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Total instructions dropped for unknown opcodes across the batch.
    pub fn degraded(&self) -> usize {
        self.decoded.iter().map(|(_, d)| d.output.degraded()).sum()
    }
}

/// Decode every `(name, bytes)` pair; failures are logged and collected.
pub fn decompile_batch<'a, I>(scripts: I, load: &LoadOptions, render: &RenderOptions) -> BatchReport
where
    I: IntoIterator<Item = (String, &'a [u8])>,
{
    let mut report = BatchReport::default();
    for (name, bytes) in scripts {
        match decode(bytes, load, render) {
            Ok(d) => {
                if !d.output.warnings.is_empty() {
                    log::warn!("{}: {} warning(s)", name, d.output.warnings.len());
                }
                log::info!("{}: decompiled", name);
                report.decoded.push((name, d));
            }
            Err(e) => {
                log::error!("{}: skipped: {}", name, e);
                report.skipped.push((name, e));
            }
        }
    }
    report
}
