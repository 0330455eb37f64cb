// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod shell;

use std::fs::File;
use std::io::{Read, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tinyfat_ds_std::ImageBacking;
use tinyfat_err::Result;
use tinyfat_fs::Filesystem;

#[derive(Parser)]
#[command(name = "tinyfat", about = "Create, inspect and mount tinyfat disk images")]
struct Cli {
    /// Path to the disk image.
    #[arg(short = 'f', long = "filesystem", global = true)]
    filesystem: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh, empty image at the given path.
    Create,
    /// Print the directory tree of an existing image.
    List,
    /// Copy a host file into the image.
    AddFile {
        host_path: PathBuf,
        image_path: String,
    },
    /// Create a directory inside the image.
    AddDirectory { image_path: String },
    /// Remove a file or empty directory from the image.
    Remove { image_path: String },
    /// Copy a file out of the image to the host.
    Extract {
        image_path: String,
        host_path: PathBuf,
    },
    /// Mount the image as a FUSE file system at `mountpoint`.
    Mount { mountpoint: PathBuf },
    /// Start an interactive shell over the image.
    Shell,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Create => {
            let ds = ImageBacking::create(&cli.filesystem, tinyfat_fs::IMAGE_BYTES)?;
            Filesystem::format(ds)?;
            log::info!("created {}", cli.filesystem.display());
            Ok(())
        }
        Command::List => {
            let fs = load(&cli.filesystem)?;
            print_tree(&fs, "/", 0)
        }
        Command::AddFile { host_path, image_path } => {
            let fs = load(&cli.filesystem)?;
            let mut data = Vec::new();
            File::open(&host_path)?.read_to_end(&mut data)?;
            fs.create_file_path(&image_path)?;
            fs.write_file_path(&image_path, 0, &data)?;
            Ok(())
        }
        Command::AddDirectory { image_path } => {
            let fs = load(&cli.filesystem)?;
            fs.mkdir_path(&image_path)?;
            Ok(())
        }
        Command::Remove { image_path } => {
            let fs = load(&cli.filesystem)?;
            fs.remove_path(&image_path)
        }
        Command::Extract { image_path, host_path } => {
            let fs = load(&cli.filesystem)?;
            let mut out = File::create(&host_path)?;
            let mut offset = 0u64;
            let mut buf = vec![0u8; tinyfat_fs::BLOCK_BYTES];
            loop {
                let n = fs.read_file_path(&image_path, offset, &mut buf)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
                offset += n as u64;
            }
            Ok(())
        }
        Command::Mount { mountpoint } => {
            let fs = load(&cli.filesystem)?;
            let adapter = tinyfat_bridge::TinyFatFuse::new(fs);
            fuser::mount2(adapter, &mountpoint, &[])?;
            Ok(())
        }
        Command::Shell => {
            let fs = load(&cli.filesystem)?;
            shell::run(fs)
        }
    }
}

fn load(path: &std::path::Path) -> Result<Filesystem<ImageBacking>> {
    let ds = ImageBacking::load(path)?;
    Filesystem::open(ds)
}

fn print_tree(fs: &Filesystem<ImageBacking>, path: &str, depth: usize) -> Result<()> {
    for entry in fs.list_dir_path(path)? {
        let name = tinyfat_fs::decode_name(&entry.name);
        if name == "." || name == ".." {
            continue;
        }
        println!("{}{}", "  ".repeat(depth), name);
        if tinyfat_fs::is_directory(&entry) {
            let child_path = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
            print_tree(fs, &child_path, depth + 1)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_load_round_trips_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("test.img");

        let ds = ImageBacking::create(&image, tinyfat_fs::IMAGE_BYTES).unwrap();
        Filesystem::format(ds).unwrap();

        let fs = load(&image).unwrap();
        fs.create_file_path("/hello.txt").unwrap();
        fs.write_file_path("/hello.txt", 0, b"hi").unwrap();
        drop(fs);

        let fs = load(&image).unwrap();
        let mut out = [0u8; 2];
        fs.read_file_path("/hello.txt", 0, &mut out).unwrap();
        assert_eq!(&out, b"hi");
    }
}
