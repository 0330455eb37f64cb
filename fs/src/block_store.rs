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

use tinyfat_ds::DataStorage;
use tinyfat_err::Result;
use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::dir_entry::DirEntry;
use crate::{BLOCK_BYTES, DIR_ENTRY_BYTES, TABLE_BYTES};

/// The block store: `TOTAL_BLOCKS` fixed `BLOCK_BYTES` blocks following the
/// allocation table. Blocks hold either directory records or raw file
/// payload, depending on what their owning directory entry says they are.
pub struct BlockStore<'ds, DS: DataStorage> {
    ds: &'ds DS,
}

impl<'ds, DS: DataStorage> BlockStore<'ds, DS> {
    pub fn new(ds: &'ds DS) -> Self {
        Self { ds }
    }

    fn block_offset(block: u16) -> u64 {
        TABLE_BYTES as u64 + block as u64 * BLOCK_BYTES as u64
    }

    pub fn read_block(&self, block: u16, buffer: &mut [u8; BLOCK_BYTES]) -> Result<()> {
        self.ds.read(Self::block_offset(block), buffer)
    }

    pub fn write_block(&self, block: u16, buffer: &[u8; BLOCK_BYTES]) -> Result<()> {
        self.ds.write(Self::block_offset(block), buffer)
    }

    pub fn zero_block(&self, block: u16) -> Result<()> {
        self.write_block(block, &[0u8; BLOCK_BYTES])
    }

    pub fn read_record(&self, block: u16, slot: u8) -> Result<DirEntry> {
        let mut entry = DirEntry::new_zeroed();
        let offset = Self::block_offset(block) + slot as u64 * DIR_ENTRY_BYTES as u64;
        self.ds.read(offset, entry.as_mut_bytes())?;
        Ok(entry)
    }

    pub fn write_record(&self, block: u16, slot: u8, entry: &DirEntry) -> Result<()> {
        let offset = Self::block_offset(block) + slot as u64 * DIR_ENTRY_BYTES as u64;
        self.ds.write(offset, entry.as_bytes())
    }
}
