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

use tinyfat_ds_std::ImageBacking;
use tinyfat_err::{Error, FsError};
use tinyfat_fs::Filesystem;

fn fresh_image() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.img");
    (dir, path)
}

#[test]
fn format_produces_an_exact_size_image() {
    let (_dir, path) = fresh_image();
    let ds = ImageBacking::create(&path, tinyfat_fs::IMAGE_BYTES).unwrap();
    Filesystem::format(ds).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), tinyfat_fs::IMAGE_BYTES);
}

#[test]
fn reopening_an_existing_image_preserves_contents() {
    let (_dir, path) = fresh_image();
    let ds = ImageBacking::create(&path, tinyfat_fs::IMAGE_BYTES).unwrap();
    let fs = Filesystem::format(ds).unwrap();
    fs.mkdir_path("/docs").unwrap();
    fs.create_file_path("/docs/a.txt").unwrap();
    fs.write_file_path("/docs/a.txt", 0, b"persisted").unwrap();
    drop(fs);

    let ds = ImageBacking::load(&path).unwrap();
    let fs = Filesystem::open(ds).unwrap();
    let mut out = vec![0u8; b"persisted".len()];
    fs.read_file_path("/docs/a.txt", 0, &mut out).unwrap();
    assert_eq!(&out, b"persisted");
}

#[test]
fn deep_directory_tree_and_cascading_removal() {
    let (_dir, path) = fresh_image();
    let ds = ImageBacking::create(&path, tinyfat_fs::IMAGE_BYTES).unwrap();
    let fs = Filesystem::format(ds).unwrap();

    fs.mkdir_path("/a").unwrap();
    fs.mkdir_path("/a/b").unwrap();
    fs.create_file_path("/a/b/leaf.txt").unwrap();
    fs.write_file_path("/a/b/leaf.txt", 0, &vec![9u8; tinyfat_fs::BLOCK_BYTES * 2]).unwrap();

    // Non-empty directories refuse removal at every level.
    assert!(matches!(fs.remove_path("/a").unwrap_err(), Error::Fs(FsError::NotEmpty)));
    assert!(matches!(fs.remove_path("/a/b").unwrap_err(), Error::Fs(FsError::NotEmpty)));

    let free_before = fs.free_block_count().unwrap();
    fs.remove_path("/a/b/leaf.txt").unwrap();
    let free_after = fs.free_block_count().unwrap();
    assert!(free_after > free_before, "removing a multi-block file must free its chain");

    fs.remove_path("/a/b").unwrap();
    fs.remove_path("/a").unwrap();
    assert!(fs.resolve("/a").unwrap().is_none());
}

#[test]
fn name_too_long_is_rejected() {
    let (_dir, path) = fresh_image();
    let ds = ImageBacking::create(&path, tinyfat_fs::IMAGE_BYTES).unwrap();
    let fs = Filesystem::format(ds).unwrap();
    assert!(matches!(
        fs.create_file_path("/this-name-is-too-long.txt").unwrap_err(),
        Error::Fs(FsError::NameTooLong)
    ));
}

#[test]
fn removing_a_file_frees_its_block_for_reuse() {
    let (_dir, path) = fresh_image();
    let ds = ImageBacking::create(&path, tinyfat_fs::IMAGE_BYTES).unwrap();
    let fs = Filesystem::format(ds).unwrap();

    fs.create_file_path("/a.bin").unwrap();
    fs.write_file_path("/a.bin", 0, &[1u8; 16]).unwrap();
    let free_before = fs.free_block_count().unwrap();

    fs.remove_path("/a.bin").unwrap();
    let free_after = fs.free_block_count().unwrap();
    assert_eq!(free_after, free_before + 1);

    fs.create_file_path("/b.bin").unwrap();
    fs.write_file_path("/b.bin", 0, &[2u8; 16]).unwrap();
    assert_eq!(fs.free_block_count().unwrap(), free_before);
}
