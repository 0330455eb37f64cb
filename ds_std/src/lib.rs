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

use std::{
    cell::UnsafeCell,
    fs::{File, OpenOptions},
    path::Path,
};

use log::debug;
use memmap2::MmapMut;
use tinyfat_ds::{DataStorage, Error, Result};

/// A fixed-size byte region backed by a memory-mapped file on disk.
///
/// The mapping is created once at `create`/`load` time and lives for the
/// lifetime of the value; it is flushed back to disk when dropped.
pub struct ImageBacking {
    _file: File,
    mmap: UnsafeCell<MmapMut>,
    len: u64,
}

// Single-threaded cooperative access only: the core never shares an
// `ImageBacking` across threads, but it is passed by shared reference through
// the call graph, hence the `UnsafeCell` for interior mutability.
unsafe impl Sync for ImageBacking {}

impl ImageBacking {
    /// Creates a new, zero-filled image of exactly `len` bytes. Fails if the
    /// path already exists.
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "image already exists",
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(len)?;

        debug!("created image {} ({len} bytes)", path.display());
        Self::from_file(file, len)
    }

    /// Opens an existing image file and maps it read-write.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        debug!("loaded image {} ({len} bytes)", path.display());
        Self::from_file(file, len)
    }

    fn from_file(file: File, len: u64) -> Result<Self> {
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            _file: file,
            mmap: UnsafeCell::new(mmap),
            len,
        })
    }

    fn mmap(&self) -> &MmapMut {
        unsafe { &*self.mmap.get() }
    }

    #[allow(clippy::mut_from_ref)]
    fn mmap_mut(&self) -> &mut MmapMut {
        unsafe { &mut *self.mmap.get() }
    }
}

impl DataStorage for ImageBacking {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        buffer.copy_from_slice(&self.mmap()[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        self.mmap_mut()[start..end].copy_from_slice(buffer);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}
