//! BLIF (Berkeley Logic Interchange Format) netlist writer.

use std::fs::File;
use std::io::Write;

use log::info;
use thiserror::Error;

use rtlir_netlist::Design;

mod export;

pub use export::write_blif;

/// A buffer cell emitted in place of `.names` pass-throughs when `-buf` is
/// given.
#[derive(Clone, Debug)]
pub struct BufCell {
    pub ty: String,
    pub input: String,
    pub output: String,
}

/// A constant-driver cell emitted in place of the default `.names $true` /
/// `.names $false` definitions.
#[derive(Clone, Debug)]
pub struct ConstCell {
    pub ty: String,
    pub output: String,
}

/// Output options, mirroring the `write_blif` flags.
#[derive(Clone, Debug, Default)]
pub struct BlifConfig {
    /// Emit this module first; defaults to the module with a `top` attribute.
    pub top: Option<String>,
    pub buf: Option<BufCell>,
    pub true_cell: Option<ConstCell>,
    pub false_cell: Option<ConstCell>,
    /// Emit builtin gates as `.subckt`/`.gate` instead of translating them.
    pub icells: bool,
    /// Emit `.gate` for cells that are not modules of this design.
    pub gates: bool,
    /// Emit nonstandard `.conn` statements for connections.
    pub conn: bool,
    /// Emit nonstandard `.param` lines for cell parameters.
    pub param: bool,
    /// Omit the `$true`/`$false` definitions.
    pub impltf: bool,
}

/// Fatal conditions; no output is produced for the offending module.
#[derive(Debug, Error)]
pub enum BlifError {
    #[error("found unmapped processes in module {0}: unmapped processes are not supported in BLIF output")]
    UnmappedProcesses(String),
    #[error("found unmapped memories in module {0}: unmapped memories are not supported in BLIF output")]
    UnmappedMemories(String),
    #[error("can't find top module {0}")]
    UnknownTop(String),
    #[error("cell {cell}: {reason}")]
    MalformedCell { cell: String, reason: String },
    #[error("unsupported option {0}")]
    UnsupportedOption(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Yield a writable sink plus a name for diagnostics; no filename means the
/// default sink (stdout).
pub fn open_output(filename: Option<&str>) -> Result<(Box<dyn Write>, String), BlifError> {
    match filename {
        Some(name) => Ok((Box::new(File::create(name)?), name.to_owned())),
        None => Ok((Box::new(std::io::stdout()), "<stdout>".to_owned())),
    }
}

/// `write_blif [flags] [filename]`.
pub fn blif_command(design: &Design, args: &[String]) -> Result<(), BlifError> {
    let (config, filename) = parse_args(args)?;
    info!("Executing BLIF backend.");
    let (mut sink, _name) = open_output(filename.as_deref())?;
    write_blif(design, &config, &mut sink)
}

fn parse_args(args: &[String]) -> Result<(BlifConfig, Option<String>), BlifError> {
    let mut config = BlifConfig::default();
    let mut filename = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-top" => config.top = Some(take(&mut iter, arg)?),
            "-buf" => {
                config.buf = Some(BufCell {
                    ty: take(&mut iter, arg)?,
                    input: take(&mut iter, arg)?,
                    output: take(&mut iter, arg)?,
                })
            }
            "-true" => {
                config.true_cell =
                    Some(ConstCell { ty: take(&mut iter, arg)?, output: take(&mut iter, arg)? })
            }
            "-false" => {
                config.false_cell =
                    Some(ConstCell { ty: take(&mut iter, arg)?, output: take(&mut iter, arg)? })
            }
            "-icells" => config.icells = true,
            "-gates" => config.gates = true,
            "-conn" => config.conn = true,
            "-param" => config.param = true,
            "-impltf" => config.impltf = true,
            _ if arg.starts_with('-') => {
                return Err(BlifError::UnsupportedOption(arg.clone()));
            }
            _ => {
                if filename.is_some() {
                    return Err(BlifError::UnsupportedOption(arg.clone()));
                }
                filename = Some(arg.clone());
            }
        }
    }
    Ok((config, filename))
}

fn take(iter: &mut std::slice::Iter<String>, flag: &str) -> Result<String, BlifError> {
    iter.next().cloned().ok_or_else(|| BlifError::UnsupportedOption(flag.to_owned()))
}
