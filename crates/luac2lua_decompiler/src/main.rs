use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use luadec_core::{decompile_batch, listing, Decoded, LoadOptions, Nls};

mod config;
mod export;

use crate::config::AppConfig;
use crate::export::ChunkMetadata;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lua 5.0 bytecode to Lua decompiler")]
struct Args {
    /// Compiled chunk; repeat for a batch.
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// Output directory.
    #[arg(short, long)]
    output: PathBuf,

    /// Code page of string constants: utf8, sjis or gbk.
    #[arg(short, long, default_value = "utf8")]
    lang: Nls,

    /// Also write a `.lst` disassembly listing.
    #[arg(long)]
    listing: bool,

    /// Also write `.yaml` chunk metadata.
    #[arg(long)]
    yaml: bool,

    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    line_comments: bool,
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn write_outputs(args: &Args, stem: &str, decoded: &Decoded) -> Result<()> {
    let lua = args.output.join(format!("{}.lua", stem));
    fs::write(&lua, &decoded.output.source)
        .with_context(|| format!("failed to write {}", lua.display()))?;

    if args.listing {
        let lst = args.output.join(format!("{}.lst", stem));
        fs::write(&lst, listing(&decoded.image))
            .with_context(|| format!("failed to write {}", lst.display()))?;
    }

    if args.yaml {
        let yaml = args.output.join(format!("{}.yaml", stem));
        ChunkMetadata::new(&decoded.image, &decoded.output.warnings).export_yaml(&yaml)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.init_logger();

    let mut render = config.render.clone();
    render.line_comments |= args.line_comments;
    let load = LoadOptions { nls: args.lang };

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let mut failed = 0usize;
    let mut scripts = Vec::with_capacity(args.input.len());
    for path in &args.input {
        match fs::read(path) {
            Ok(bytes) => scripts.push((path.display().to_string(), stem_of(path), bytes)),
            Err(e) => {
                log::error!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    let report = decompile_batch(
        scripts.iter().map(|(name, _, bytes)| (name.clone(), bytes.as_slice())),
        &load,
        &render,
    );
    failed += report.skipped.len();

    for (name, decoded) in &report.decoded {
        for warning in &decoded.output.warnings {
            log::warn!("{}: {}", name, warning);
        }
        let stem = scripts
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, stem, _)| stem.as_str())
            .unwrap_or("output");
        if let Err(e) = write_outputs(&args, stem, decoded) {
            log::error!("{}: {:#}", name, e);
            failed += 1;
        }
    }

    log::info!(
        "{} decompiled, {} failed, {} instruction(s) degraded",
        report.decoded.len(),
        failed,
        report.degraded()
    );
    if failed > 0 {
        bail!("{} of {} input(s) failed", failed, args.input.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn repeated_inputs_and_lang() {
        let args = Args::try_parse_from([
            "luac2lua_decompiler",
            "-i",
            "a.luac",
            "-i",
            "dir/b.luac",
            "-o",
            "out",
            "--lang",
            "sjis",
            "--listing",
        ])
        .unwrap();
        assert_eq!(args.input.len(), 2);
        assert_eq!(args.lang, Nls::ShiftJis);
        assert!(args.listing);
        assert!(!args.yaml);
        assert_eq!(stem_of(&args.input[1]), "b");
    }

    #[test]
    fn input_is_required() {
        assert!(Args::try_parse_from(["luac2lua_decompiler", "-o", "out"]).is_err());
    }
}
