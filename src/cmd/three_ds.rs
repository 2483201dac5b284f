use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use argh::FromArgs;
use meshlib::{
    format::chunk::Chunk,
    mesh::hierarchy::BoneTree,
    model::{ConvertOptions, Model, DEFAULT_SCALE},
    util::file::map_file,
};

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process 3DS files
#[argh(subcommand, name = "3ds")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Convert(ConvertArgs),
    Dump(DumpArgs),
}

#[derive(FromArgs, PartialEq, Debug)]
/// converts a 3DS file to mesh buffers
#[argh(subcommand, name = "convert")]
pub struct ConvertArgs {
    #[argh(positional)]
    /// input file
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output JSON file
    output: Option<PathBuf>,
    #[argh(option, short = 'r')]
    /// object hierarchy as nested index lists, e.g. "[0, 1, [2, 3]]"
    hierarchy: Option<String>,
    #[argh(option, default = "DEFAULT_SCALE")]
    /// scale applied to positions and offsets
    scale: f32,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// prints the chunk tree of a 3DS file
#[argh(subcommand, name = "dump")]
pub struct DumpArgs {
    #[argh(positional)]
    /// input file
    input: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Convert(c_args) => convert(c_args),
        SubCommand::Dump(c_args) => dump(c_args),
    }
}

fn convert(args: ConvertArgs) -> Result<()> {
    ensure!(args.scale.is_finite() && args.scale > 0.0, "Invalid scale {}", args.scale);
    let hierarchy = args
        .hierarchy
        .as_deref()
        .map(|s| {
            serde_json::from_str::<BoneTree>(s).with_context(|| format!("Invalid hierarchy '{s}'"))
        })
        .transpose()?;
    let data = map_file(&args.input)?;
    let model = Model::from_3ds(&data, &ConvertOptions { scale: args.scale, hierarchy })
        .with_context(|| format!("Failed to convert '{}'", args.input.display()))?;
    let buffers = model.buffers();
    match &args.output {
        Some(path) => {
            write_json(path, &model.document(&buffers))?;
            log::info!("Wrote {} vertices to '{}'", buffers.vertex_count(), path.display());
        }
        None => {
            for line in model.hierarchy.outline().lines() {
                log::info!("{line}");
            }
            log::info!("{} vertices", buffers.vertex_count());
        }
    }
    Ok(())
}

fn dump(args: DumpArgs) -> Result<()> {
    let data = map_file(&args.input)?;
    let root = Chunk::read(&data)
        .with_context(|| format!("Failed to read '{}'", args.input.display()))?;
    for line in root.dump().lines() {
        log::info!("{line}");
    }
    Ok(())
}
