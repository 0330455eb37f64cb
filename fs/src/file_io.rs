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

use crate::dir_entry::{attr, encode_name, DirEntry};
use crate::{EntryLoc, Filesystem, Timestamp, BLOCK_BYTES, END_OF_CHAIN};

impl<DS: DataStorage> Filesystem<DS> {
    /// Creates a zero-length regular file named `name` under `parent_block`.
    /// Allocates a single terminal block up front, per the file I/O engine's
    /// contract that every file, even an empty one, owns exactly one block.
    pub fn create_empty_file(&self, parent_block: u16, name: &str) -> Result<EntryLoc> {
        let name_bytes = encode_name(name)?;
        let block = self.alloc().find_free()?;
        self.alloc().set(block, END_OF_CHAIN)?;
        self.blocks().zero_block(block)?;

        let mut record = DirEntry {
            name: name_bytes,
            attributes: attr::ARCHIVE,
            ..Default::default()
        };
        record.first_cluster_low.set(block);
        Timestamp::now().apply(&mut record);

        match self.append_entry(parent_block, record) {
            Ok(loc) => Ok(loc),
            Err(e) => {
                self.alloc().release_chain(block)?;
                Err(e)
            }
        }
    }

    /// Creates a file named `name` under `parent_block` containing exactly
    /// `source_bytes`: allocates the whole chain up front and copies the
    /// payload in, padding the final block's tail with zeros.
    pub fn append_file(&self, parent_block: u16, name: &str, source_bytes: &[u8]) -> Result<EntryLoc> {
        let loc = self.create_empty_file(parent_block, name)?;
        if source_bytes.is_empty() {
            return Ok(loc);
        }
        let mut entry = self.blocks().read_record(loc.block, loc.slot)?;
        self.write_file(loc, &mut entry, 0, source_bytes)?;
        Ok(loc)
    }

    /// Reads up to `buffer.len()` bytes starting at `offset` into `buffer`,
    /// returning the number of bytes actually read. Reading at or past the
    /// end of the file yields zero, never an error.
    pub fn read_file(&self, entry: &DirEntry, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let size = entry.size.get() as u64;
        if offset >= size || buffer.is_empty() {
            return Ok(0);
        }
        let to_read = buffer.len().min((size - offset) as usize);
        let head = entry.first_cluster_low.get();
        if head == END_OF_CHAIN {
            return Ok(0);
        }

        let mut remaining = to_read;
        let mut pos = offset;
        let mut written = 0usize;
        let mut block = self.block_at(head, (pos / BLOCK_BYTES as u64) as usize)?;

        while remaining > 0 {
            let in_block_offset = (pos % BLOCK_BYTES as u64) as usize;
            let chunk = remaining.min(BLOCK_BYTES - in_block_offset);

            let mut raw = [0u8; BLOCK_BYTES];
            self.blocks().read_block(block, &mut raw)?;
            buffer[written..written + chunk].copy_from_slice(&raw[in_block_offset..in_block_offset + chunk]);

            written += chunk;
            pos += chunk as u64;
            remaining -= chunk;

            if remaining > 0 {
                block = self.alloc().next(block)?;
                if block == END_OF_CHAIN {
                    log::error!("file chain shorter than its recorded size");
                    return Err(FsError::Corrupt.into());
                }
            }
        }
        Ok(written)
    }

    /// Walks the chain starting at `head` forward `index` links, erroring on
    /// a short chain.
    fn block_at(&self, head: u16, index: usize) -> Result<u16> {
        let mut cur = head;
        for _ in 0..index {
            cur = self.alloc().next(cur)?;
            if cur == END_OF_CHAIN {
                log::error!("file chain shorter than its recorded size");
                return Err(FsError::Corrupt.into());
            }
        }
        Ok(cur)
    }

    /// Writes `buffer` at `offset`, growing the chain and the recorded size
    /// as needed. Writing past the current end of file is rejected rather
    /// than sparsely extended.
    pub fn write_file(&self, loc: EntryLoc, entry: &mut DirEntry, offset: u64, buffer: &[u8]) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }
        let size = entry.size.get() as u64;
        if offset > size {
            return Ok(0);
        }

        let head = entry.first_cluster_low.get();
        let head = if head == END_OF_CHAIN {
            let block = self.alloc().find_free()?;
            self.alloc().set(block, END_OF_CHAIN)?;
            self.blocks().zero_block(block)?;
            entry.first_cluster_low.set(block);
            block
        } else {
            head
        };

        let end = offset + buffer.len() as u64;
        let blocks_needed = end.div_ceil(BLOCK_BYTES as u64) as usize;
        let (mut have, mut tail) = self.alloc().chain_len_and_tail(head)?;
        while have < blocks_needed {
            tail = self.alloc().extend(tail)?;
            self.blocks().zero_block(tail)?;
            have += 1;
        }

        let mut pos = offset;
        let mut written = 0usize;
        let mut block = self.block_at(head, (pos / BLOCK_BYTES as u64) as usize)?;

        while written < buffer.len() {
            let in_block_offset = (pos % BLOCK_BYTES as u64) as usize;
            let chunk = (buffer.len() - written).min(BLOCK_BYTES - in_block_offset);

            let mut raw = [0u8; BLOCK_BYTES];
            self.blocks().read_block(block, &mut raw)?;
            raw[in_block_offset..in_block_offset + chunk].copy_from_slice(&buffer[written..written + chunk]);
            self.blocks().write_block(block, &raw)?;

            written += chunk;
            pos += chunk as u64;

            if written < buffer.len() {
                block = self.alloc().next(block)?;
            }
        }

        if end > size {
            entry.size.set(end as u32);
        }
        Timestamp::now().apply_as_touch(entry);
        self.blocks().write_record(loc.block, loc.slot, entry)?;
        Ok(written)
    }

    /// Resizes `entry` to `new_size`. Shrinking releases now-unused tail
    /// blocks; growing allocates and zeroes new blocks (grow-only truncate
    /// does allocate, per DESIGN.md).
    pub fn truncate_file(&self, loc: EntryLoc, entry: &mut DirEntry, new_size: u32) -> Result<()> {
        let current = entry.size.get();
        if new_size == current {
            return Ok(());
        }

        let head = entry.first_cluster_low.get();
        if new_size == 0 {
            if head != END_OF_CHAIN {
                let next = self.alloc().next(head)?;
                if next != END_OF_CHAIN {
                    self.alloc().set(head, END_OF_CHAIN)?;
                    self.alloc().release_chain(next)?;
                }
                self.blocks().zero_block(head)?;
            }
            entry.size.set(0);
            Timestamp::now().apply_as_touch(entry);
            return self.blocks().write_record(loc.block, loc.slot, entry);
        }

        let blocks_needed = (new_size as u64).div_ceil(BLOCK_BYTES as u64) as usize;
        let head = if head == END_OF_CHAIN {
            let block = self.alloc().find_free()?;
            self.alloc().set(block, END_OF_CHAIN)?;
            self.blocks().zero_block(block)?;
            entry.first_cluster_low.set(block);
            block
        } else {
            head
        };

        let (have, mut tail) = self.alloc().chain_len_and_tail(head)?;
        if blocks_needed > have {
            let mut have = have;
            while have < blocks_needed {
                tail = self.alloc().extend(tail)?;
                self.blocks().zero_block(tail)?;
                have += 1;
            }
        } else if blocks_needed < have {
            let mut cur = head;
            for _ in 0..blocks_needed - 1 {
                cur = self.alloc().next(cur)?;
            }
            let first_to_free = self.alloc().next(cur)?;
            self.alloc().set(cur, END_OF_CHAIN)?;
            if first_to_free != END_OF_CHAIN {
                self.alloc().release_chain(first_to_free)?;
            }
        }

        if new_size > current {
            self.zero_tail_growth(head, current, new_size)?;
        }

        entry.size.set(new_size);
        Timestamp::now().apply_as_touch(entry);
        self.blocks().write_record(loc.block, loc.slot, entry)
    }

    /// Zeroes the byte range `[old_size, new_size)` that truncate's grow path
    /// just brought into existence, so previously-unreachable payload never
    /// surfaces as old data.
    fn zero_tail_growth(&self, head: u16, old_size: u32, new_size: u32) -> Result<()> {
        let zeros = vec![0u8; BLOCK_BYTES];
        let mut pos = old_size as u64;
        while pos < new_size as u64 {
            let block = self.block_at(head, (pos / BLOCK_BYTES as u64) as usize)?;
            let in_block_offset = (pos % BLOCK_BYTES as u64) as usize;
            let chunk = ((new_size as u64 - pos) as usize).min(BLOCK_BYTES - in_block_offset);

            let mut raw = [0u8; BLOCK_BYTES];
            self.blocks().read_block(block, &mut raw)?;
            raw[in_block_offset..in_block_offset + chunk].copy_from_slice(&zeros[..chunk]);
            self.blocks().write_block(block, &raw)?;
            pos += chunk as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tinyfat_ds_std::ImageBacking;

    use super::*;

    fn fresh() -> Filesystem<ImageBacking> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.img");
        let ds = ImageBacking::create(&path, crate::IMAGE_BYTES).unwrap();
        let fs = Filesystem::format(ds).unwrap();
        std::mem::forget(dir);
        fs
    }

    #[test]
    fn write_then_read_round_trips_within_one_block() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "a.txt").unwrap();
        let mut entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();

        let payload = b"hello, tinyfat";
        let n = fs.write_file(loc, &mut entry, 0, payload).unwrap();
        assert_eq!(n, payload.len());
        assert_eq!(entry.size.get() as usize, payload.len());

        let mut out = vec![0u8; payload.len()];
        let r = fs.read_file(&entry, 0, &mut out).unwrap();
        assert_eq!(r, payload.len());
        assert_eq!(&out, payload);
    }

    #[test]
    fn write_spanning_multiple_blocks_extends_the_chain() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "big.bin").unwrap();
        let mut entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();

        let payload = vec![7u8; BLOCK_BYTES * 3 + 10];
        fs.write_file(loc, &mut entry, 0, &payload).unwrap();
        assert_eq!(entry.size.get() as usize, payload.len());

        let (len, _) = fs.alloc().chain_len_and_tail(entry.first_cluster_low.get()).unwrap();
        assert_eq!(len, 4);

        let mut out = vec![0u8; payload.len()];
        fs.read_file(&entry, 0, &mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn write_past_end_of_file_is_rejected() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "a.txt").unwrap();
        let mut entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();
        let n = fs.write_file(loc, &mut entry, 100, b"x").unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn read_past_end_of_file_returns_zero() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "a.txt").unwrap();
        let entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();
        let mut out = [0u8; 16];
        assert_eq!(fs.read_file(&entry, 0, &mut out).unwrap(), 0);
    }

    #[test]
    fn truncate_grows_and_zero_fills() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "a.txt").unwrap();
        let mut entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();
        fs.write_file(loc, &mut entry, 0, b"hi").unwrap();

        fs.truncate_file(loc, &mut entry, 10).unwrap();
        assert_eq!(entry.size.get(), 10);

        let mut out = [0u8; 10];
        fs.read_file(&entry, 0, &mut out).unwrap();
        assert_eq!(&out[..2], b"hi");
        assert_eq!(&out[2..], &[0u8; 8]);
    }

    #[test]
    fn truncate_shrinks_and_releases_tail_blocks() {
        let fs = fresh();
        let loc = fs.create_empty_file(crate::ROOT_BLOCK, "big.bin").unwrap();
        let mut entry = fs.blocks().read_record(loc.block, loc.slot).unwrap();
        let payload = vec![1u8; BLOCK_BYTES * 2 + 1];
        fs.write_file(loc, &mut entry, 0, &payload).unwrap();

        fs.truncate_file(loc, &mut entry, 5).unwrap();
        assert_eq!(entry.size.get(), 5);
        let (len, _) = fs.alloc().chain_len_and_tail(entry.first_cluster_low.get()).unwrap();
        assert_eq!(len, 1);
    }
}
