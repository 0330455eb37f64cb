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

//! A minimal line-oriented shell over a mounted image, read from stdin.

use std::io::{self, Write as _};

use tinyfat_ds_std::ImageBacking;
use tinyfat_err::Result;
use tinyfat_fs::Filesystem;

fn join(cwd: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    if cwd == "/" {
        format!("/{name}")
    } else {
        format!("{cwd}/{name}")
    }
}

pub fn run(fs: Filesystem<ImageBacking>) -> Result<()> {
    let mut cwd = String::from("/");
    let stdin = io::stdin();

    loop {
        print!("tinyfat:{cwd}> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else { continue };
        let args: Vec<&str> = words.collect();

        if let Err(err) = dispatch(&fs, &mut cwd, cmd, &args) {
            if cmd == "exit" {
                break;
            }
            eprintln!("error: {err}");
        }
        if cmd == "exit" {
            break;
        }
    }
    Ok(())
}

fn dispatch(fs: &Filesystem<ImageBacking>, cwd: &mut String, cmd: &str, args: &[&str]) -> Result<()> {
    match cmd {
        "pwd" => {
            println!("{cwd}");
            Ok(())
        }
        "help" => {
            println!("cd ls mkdir touch rm cat extract pwd help exit");
            Ok(())
        }
        "cd" => {
            let target = args.first().copied().unwrap_or("/");
            let path = join(cwd, target);
            fs.resolve_dir(&path)?;
            *cwd = path;
            Ok(())
        }
        "ls" => {
            let path = args.first().map(|a| join(cwd, a)).unwrap_or_else(|| cwd.clone());
            for entry in fs.list_dir_path(&path)? {
                let name = tinyfat_fs::decode_name(&entry.name);
                if name == "." || name == ".." {
                    continue;
                }
                if tinyfat_fs::is_directory(&entry) {
                    println!("{name}/");
                } else {
                    println!("{name}\t{}", entry.size.get());
                }
            }
            Ok(())
        }
        "mkdir" => {
            let Some(name) = args.first() else {
                return Ok(());
            };
            fs.mkdir_path(&join(cwd, name))?;
            Ok(())
        }
        "touch" | "add" => {
            let Some(name) = args.first() else {
                return Ok(());
            };
            fs.create_file_path(&join(cwd, name))?;
            Ok(())
        }
        "rm" => {
            let Some(name) = args.first() else {
                return Ok(());
            };
            fs.remove_path(&join(cwd, name))
        }
        "cat" => {
            let Some(name) = args.first() else {
                return Ok(());
            };
            let path = join(cwd, name);
            let mut offset = 0u64;
            let mut buf = vec![0u8; tinyfat_fs::BLOCK_BYTES];
            loop {
                let n = fs.read_file_path(&path, offset, &mut buf)?;
                if n == 0 {
                    break;
                }
                io::stdout().write_all(&buf[..n]).ok();
                offset += n as u64;
            }
            Ok(())
        }
        "extract" => {
            let (Some(image_name), Some(host_name)) = (args.first(), args.get(1)) else {
                return Ok(());
            };
            let path = join(cwd, image_name);
            let mut out = std::fs::File::create(host_name)?;
            let mut offset = 0u64;
            let mut buf = vec![0u8; tinyfat_fs::BLOCK_BYTES];
            loop {
                let n = fs.read_file_path(&path, offset, &mut buf)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
                offset += n as u64;
            }
            Ok(())
        }
        "exit" => Ok(()),
        other => {
            println!("unknown command: {other} (try \"help\")");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_absolute_and_relative_names() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a", "/b"), "/b");
    }
}
