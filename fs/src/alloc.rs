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
use tinyfat_err::{FsError, Result};
use zerocopy::{little_endian::U16, IntoBytes};

use crate::{END_OF_CHAIN, FREE, TOTAL_BLOCKS};

/// The allocation table: `TOTAL_BLOCKS` little-endian u16 cells at the start
/// of the image, one per block, forming disjoint singly-linked chains.
pub struct AllocationTable<'ds, DS: DataStorage> {
    ds: &'ds DS,
}

impl<'ds, DS: DataStorage> AllocationTable<'ds, DS> {
    pub fn new(ds: &'ds DS) -> Self {
        Self { ds }
    }

    fn cell_offset(index: u16) -> u64 {
        index as u64 * 2
    }

    pub fn get(&self, index: u16) -> Result<u16> {
        let mut cell = U16::new(0);
        self.ds.read(Self::cell_offset(index), cell.as_mut_bytes())?;
        Ok(cell.get())
    }

    pub fn set(&self, index: u16, value: u16) -> Result<()> {
        let cell = U16::new(value);
        self.ds.write(Self::cell_offset(index), cell.as_bytes())
    }

    /// The cell's raw successor value: `END_OF_CHAIN` if `index` is the last
    /// block of its chain, otherwise the next block index.
    pub fn next(&self, index: u16) -> Result<u16> {
        self.get(index)
    }

    /// Lowest-indexed free cell. Deterministic: this ordering guarantee is
    /// relied on by every caller that allocates a block.
    pub fn find_free(&self) -> Result<u16> {
        for index in 0..TOTAL_BLOCKS as u16 {
            if self.get(index)? == FREE {
                return Ok(index);
            }
        }
        Err(FsError::NoSpace.into())
    }

    pub fn last_of_chain(&self, start: u16) -> Result<u16> {
        let mut cur = start;
        while self.get(cur)? != END_OF_CHAIN {
            cur = self.get(cur)?;
        }
        Ok(cur)
    }

    /// Number of blocks in the chain starting at `head`, and the tail block.
    pub fn chain_len_and_tail(&self, head: u16) -> Result<(usize, u16)> {
        let mut len = 1usize;
        let mut cur = head;
        loop {
            let next = self.get(cur)?;
            if next == END_OF_CHAIN {
                return Ok((len, cur));
            }
            cur = next;
            len += 1;
        }
    }

    /// Extends the chain whose current tail is `tail` by one freshly
    /// allocated block, returning the new tail. `tail` must currently be
    /// `END_OF_CHAIN`.
    pub fn extend(&self, tail: u16) -> Result<u16> {
        if self.get(tail)? != END_OF_CHAIN {
            log::error!("extend called on non-terminal block {tail}");
            return Err(FsError::Corrupt.into());
        }
        let block = self.find_free()?;
        self.set(tail, block)?;
        self.set(block, END_OF_CHAIN)?;
        Ok(block)
    }

    /// Frees every block in the chain starting at `start`. Payload is left
    /// untouched; callers that need a zeroed block do so explicitly.
    pub fn release_chain(&self, start: u16) -> Result<()> {
        let mut cur = start;
        loop {
            let next = self.get(cur)?;
            self.set(cur, FREE)?;
            if next == END_OF_CHAIN {
                break;
            }
            cur = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use tinyfat_ds::DataStorage;
    use tinyfat_err::Result;

    use super::*;

    struct MemStorage(RefCell<Vec<u8>>);

    impl DataStorage for MemStorage {
        fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
            let buf = self.0.borrow();
            buffer.copy_from_slice(&buf[offset as usize..offset as usize + buffer.len()]);
            Ok(())
        }

        fn write(&self, offset: u64, buffer: &[u8]) -> Result<()> {
            let mut buf = self.0.borrow_mut();
            buf[offset as usize..offset as usize + buffer.len()].copy_from_slice(buffer);
            Ok(())
        }

        fn len(&self) -> u64 {
            self.0.borrow().len() as u64
        }
    }

    fn mem() -> MemStorage {
        MemStorage(RefCell::new(vec![0u8; TOTAL_BLOCKS * 2]))
    }

    #[test]
    fn find_free_returns_lowest_index() {
        let ds = mem();
        let table = AllocationTable::new(&ds);
        table.set(0, END_OF_CHAIN).unwrap();
        table.set(1, END_OF_CHAIN).unwrap();
        assert_eq!(table.find_free().unwrap(), 2);
    }

    #[test]
    fn extend_requires_terminal_tail() {
        let ds = mem();
        let table = AllocationTable::new(&ds);
        table.set(0, 1).unwrap();
        assert!(table.extend(0).is_err());
    }

    #[test]
    fn release_chain_frees_every_block() {
        let ds = mem();
        let table = AllocationTable::new(&ds);
        table.set(0, END_OF_CHAIN).unwrap();
        let b1 = table.extend(0).unwrap();
        let b2 = table.extend(b1).unwrap();
        table.release_chain(0).unwrap();
        assert_eq!(table.get(0).unwrap(), FREE);
        assert_eq!(table.get(b1).unwrap(), FREE);
        assert_eq!(table.get(b2).unwrap(), FREE);
    }
}
