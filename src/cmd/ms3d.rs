use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use argh::FromArgs;
use meshlib::{
    format::ms3d::Ms3dFile,
    model::ms3d_buffers,
    util::file::map_file,
};

use crate::cmd::write_json;

#[derive(FromArgs, PartialEq, Debug)]
/// process MS3D files
#[argh(subcommand, name = "ms3d")]
pub struct Args {
    #[argh(subcommand)]
    command: SubCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Convert(ConvertArgs),
    Info(InfoArgs),
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// converts an MS3D file to mesh buffers
#[argh(subcommand, name = "convert")]
pub struct ConvertArgs {
    #[argh(positional)]
    /// input file
    input: PathBuf,
    #[argh(option, short = 'o')]
    /// output JSON file (stdout if omitted)
    output: Option<PathBuf>,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// summarizes the sections of an MS3D file
#[argh(subcommand, name = "info")]
pub struct InfoArgs {
    #[argh(positional)]
    /// input file
    input: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    match args.command {
        SubCommand::Convert(c_args) => convert(c_args),
        SubCommand::Info(c_args) => info(c_args),
    }
}

fn read(input: &Path) -> Result<Ms3dFile> {
    let data = map_file(input)?;
    Ms3dFile::read(&data).with_context(|| format!("Failed to read '{}'", input.display()))
}

fn convert(args: ConvertArgs) -> Result<()> {
    let file = read(&args.input)?;
    let buffers = ms3d_buffers(&file)?;
    match &args.output {
        Some(path) => {
            write_json(path, &buffers)?;
            log::info!("Wrote {} vertices to '{}'", buffers.vertex_count(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &buffers)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn info(args: InfoArgs) -> Result<()> {
    let file = read(&args.input)?;
    log::info!("Version {}", file.version);
    log::info!("{} vertices, {} triangles", file.vertices.len(), file.triangles.len());
    for group in &file.groups {
        log::info!(
            "Group '{}': {} triangles, material {}",
            group.name,
            group.triangle_indices.len(),
            group.material_index
        );
    }
    for material in &file.materials {
        log::info!("Material '{}' texture '{}'", material.name, material.texture);
    }
    log::info!(
        "Animation: {} frames at {} fps, {} joints",
        file.animation.total_frames,
        file.animation.fps,
        file.joints.len()
    );
    for joint in &file.joints {
        log::info!(
            "Joint '{}' parent '{}': {} rotation keys, {} position keys",
            joint.name,
            joint.parent_name,
            joint.rotation_keys.len(),
            joint.position_keys.len()
        );
    }
    if let Some(comment) = &file.comments.model {
        log::info!("Comment: {comment}");
    }
    Ok(())
}
