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

//! A small FAT-style file system: a fixed-size image holding a single-linked
//! block allocation table, a block store, and directories made of 32-byte
//! packed records chained across blocks.

mod alloc;
mod block_store;
mod dir;
mod dir_entry;
mod file_io;
mod path;
mod time;

pub use tinyfat_ds::DataStorage;
pub use tinyfat_err::*;

pub use dir::LastSlot;
pub use dir_entry::{attr, decode_name, encode_name, is_deleted, is_directory, is_empty_record, is_last, DirEntry};
pub use path::split_path;
pub use time::Timestamp;

use alloc::AllocationTable;
use block_store::BlockStore;

/// Total size of the backing image, in bytes.
pub const IMAGE_BYTES: u64 = 10_000_000;
/// Number of addressable blocks.
pub const TOTAL_BLOCKS: usize = 19_000;
/// Size of a single block, in bytes.
pub const BLOCK_BYTES: usize = 512;
/// Size of a single directory record, in bytes.
pub const DIR_ENTRY_BYTES: usize = 32;
/// Directory records that fit in one block.
pub const RECORDS_PER_BLOCK: usize = BLOCK_BYTES / DIR_ENTRY_BYTES;
/// Byte length of the allocation table region.
pub const TABLE_BYTES: usize = TOTAL_BLOCKS * 2;

/// Allocation cell value marking a block as free.
pub const FREE: u16 = 0x0000;
/// Allocation cell value marking a block as the terminal block of a chain.
pub const END_OF_CHAIN: u16 = 0xFFFF;

/// Maximum length, in bytes, of a directory entry name.
pub const MAX_NAME_BYTES: usize = 11;

/// Block index of the root directory; root's "." and ".." both point here.
pub const ROOT_BLOCK: u16 = 0;

/// The location of a directory record: the block holding it, and its slot
/// (0..RECORDS_PER_BLOCK) within that block.
///
/// Handles like this, rather than pointers into the mapped image, are what
/// callers hold onto between calls; they must be re-resolved by path after
/// any mutation that could reallocate the enclosing chain (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLoc {
    pub block: u16,
    pub slot: u8,
}

/// A mounted file system instance, generic over its backing data storage.
pub struct Filesystem<DS: DataStorage> {
    ds: DS,
}

impl<DS: DataStorage> Filesystem<DS> {
    fn alloc(&self) -> AllocationTable<'_, DS> {
        AllocationTable::new(&self.ds)
    }

    fn blocks(&self) -> BlockStore<'_, DS> {
        BlockStore::new(&self.ds)
    }

    /// Formats a fresh data storage region into an empty file system: zeroes
    /// it, marks block 0 as the (single-block) root directory chain, and
    /// installs the root's "." and ".." bootstrap records.
    pub fn format(ds: DS) -> Result<Self> {
        if ds.len() != IMAGE_BYTES {
            log::error!("image size {} does not match IMAGE_BYTES", ds.len());
            return Err(FsError::Corrupt.into());
        }
        ds.zero()?;

        let fs = Self { ds };
        fs.alloc().set(ROOT_BLOCK, END_OF_CHAIN)?;

        let root = dir_entry::root_record(Timestamp::now());
        fs.initialize_directory(&root, &root)?;

        log::debug!("formatted {IMAGE_BYTES} byte image, root at block {ROOT_BLOCK}");
        Ok(fs)
    }

    /// Opens an already-formatted data storage region.
    pub fn open(ds: DS) -> Result<Self> {
        Ok(Self { ds })
    }

    /// Underlying storage length, delegated for callers that need to display it.
    pub fn image_len(&self) -> u64 {
        self.ds.len()
    }

    /// Reads the directory record stored at `loc`.
    pub fn read_record_at(&self, loc: EntryLoc) -> Result<DirEntry> {
        self.blocks().read_record(loc.block, loc.slot)
    }

    /// The entry block a directory record at `loc` owns, i.e. the block its
    /// own entries live in. Meaningful only when the record is a directory.
    pub fn block_of_record(&self, loc: EntryLoc) -> Result<u16> {
        Ok(self.read_record_at(loc)?.first_cluster_low.get())
    }

    /// Count of allocation cells currently marked FREE (used for `statfs`).
    pub fn free_block_count(&self) -> Result<u64> {
        let alloc = self.alloc();
        let mut count = 0u64;
        for i in 0..TOTAL_BLOCKS as u16 {
            if alloc.get(i)? == FREE {
                count += 1;
            }
        }
        Ok(count)
    }
}
