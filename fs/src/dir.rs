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

use crate::dir_entry::{attr, encode_name, is_deleted, is_empty_record, is_last, set_last, DirEntry};
use crate::{EntryLoc, Filesystem, Timestamp, END_OF_CHAIN, MAX_NAME_BYTES, RECORDS_PER_BLOCK};

/// Distinguishes an entirely-unwritten block from one that holds records but
/// has no terminal LAST record (corruption) — the reference implementation
/// conflated both into a single sentinel value; this is the explicit fix
/// noted as an Open Question in the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastSlot {
    Empty,
    Found(u8),
    Corrupt,
}

/// Raw, depth-first iterator over a directory's entry sequence: advances
/// slot by slot within a block, follows the allocation chain at the block
/// boundary, and stops right after yielding the LAST record. Deleted records
/// are yielded; filtering is the caller's job.
pub struct DirIter<'fs, DS: DataStorage> {
    fs: &'fs Filesystem<DS>,
    block: u16,
    slot: u8,
    done: bool,
}

impl<'fs, DS: DataStorage> Iterator for DirIter<'fs, DS> {
    type Item = Result<(EntryLoc, DirEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.slot as usize >= RECORDS_PER_BLOCK {
            match self.fs.alloc().next(self.block) {
                Ok(END_OF_CHAIN) => {
                    log::error!("directory chain ended without a LAST record");
                    self.done = true;
                    return Some(Err(FsError::Corrupt.into()));
                }
                Ok(next) => {
                    self.block = next;
                    self.slot = 0;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let loc = EntryLoc {
            block: self.block,
            slot: self.slot,
        };
        match self.fs.blocks().read_record(self.block, self.slot) {
            Ok(entry) => {
                self.slot += 1;
                if is_last(&entry) {
                    self.done = true;
                }
                Some(Ok((loc, entry)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<DS: DataStorage> Filesystem<DS> {
    pub fn iter_dir(&self, dir_head: u16) -> DirIter<'_, DS> {
        DirIter {
            fs: self,
            block: dir_head,
            slot: 0,
            done: false,
        }
    }

    /// First non-deleted record with an exact 11-byte name match.
    pub fn find_entry(&self, dir_head: u16, name: &[u8; MAX_NAME_BYTES]) -> Result<Option<(EntryLoc, DirEntry)>> {
        for item in self.iter_dir(dir_head) {
            let (loc, entry) = item?;
            if !is_deleted(&entry) && &entry.name == name {
                return Ok(Some((loc, entry)));
            }
        }
        Ok(None)
    }

    pub(crate) fn find_last_slot_in_block(&self, block: u16) -> Result<LastSlot> {
        let blocks = self.blocks();
        let mut any_used = false;
        for slot in 0..RECORDS_PER_BLOCK as u8 {
            let entry = blocks.read_record(block, slot)?;
            if is_last(&entry) {
                return Ok(LastSlot::Found(slot));
            }
            if !is_empty_record(&entry) {
                any_used = true;
            }
        }
        Ok(if any_used { LastSlot::Corrupt } else { LastSlot::Empty })
    }

    /// Appends `new_record` as the new terminal entry of `dir_head`'s entry
    /// sequence, extending the chain if the current tail block is full.
    /// Name collision is checked before any mutation.
    pub fn append_entry(&self, dir_head: u16, mut new_record: DirEntry) -> Result<EntryLoc> {
        if self.find_entry(dir_head, &new_record.name)?.is_some() {
            return Err(FsError::NameExists.into());
        }

        let tail = self.alloc().last_of_chain(dir_head)?;
        let (target_block, target_slot, prior_slot) = match self.find_last_slot_in_block(tail)? {
            LastSlot::Found(15) => (self.alloc().extend(tail)?, 0, None),
            LastSlot::Found(slot) => (tail, slot + 1, Some(slot)),
            LastSlot::Empty => (tail, 0, None),
            LastSlot::Corrupt => return Err(FsError::Corrupt.into()),
        };

        if let Some(prior_slot) = prior_slot {
            let mut prior = self.blocks().read_record(target_block, prior_slot)?;
            set_last(&mut prior, false);
            self.blocks().write_record(target_block, prior_slot, &prior)?;
        }

        set_last(&mut new_record, true);
        self.blocks().write_record(target_block, target_slot, &new_record)?;
        Ok(EntryLoc {
            block: target_block,
            slot: target_slot,
        })
    }

    /// Installs the "." and ".." bootstrap records for a freshly allocated
    /// directory block, copying timestamps from the owning entries.
    pub fn initialize_directory(&self, new_record: &DirEntry, parent_record: &DirEntry) -> Result<()> {
        let new_block = new_record.first_cluster_low.get();
        self.blocks().zero_block(new_block)?;

        let mut dot = *new_record;
        dot.name = encode_name(".")?;
        set_last(&mut dot, false);
        self.blocks().write_record(new_block, 0, &dot)?;

        let mut dotdot = *parent_record;
        dotdot.name = encode_name("..")?;
        set_last(&mut dotdot, true);
        self.blocks().write_record(new_block, 1, &dotdot)?;
        Ok(())
    }

    /// Creates a new subdirectory named `name` under `parent_block`.
    pub fn mkdir(&self, parent_block: u16, name: &str) -> Result<EntryLoc> {
        let name_bytes = encode_name(name)?;
        let block = self.alloc().find_free()?;
        self.alloc().set(block, END_OF_CHAIN)?;

        let mut record = DirEntry {
            name: name_bytes,
            attributes: attr::DIRECTORY,
            ..Default::default()
        };
        record.first_cluster_low.set(block);
        Timestamp::now().apply(&mut record);

        let loc = match self.append_entry(parent_block, record) {
            Ok(loc) => loc,
            Err(e) => {
                self.alloc().release_chain(block)?;
                return Err(e);
            }
        };

        let parent_record = self.blocks().read_record(parent_block, 0)?;
        self.initialize_directory(&record, &parent_record)?;
        Ok(loc)
    }

    /// True iff the ".." bootstrap record is still the LAST record, i.e. no
    /// third entry has ever survived in this directory.
    pub fn is_directory_empty(&self, dir_head: u16) -> Result<bool> {
        let dotdot = self.blocks().read_record(dir_head, 1)?;
        Ok(is_last(&dotdot))
    }

    /// Marks the record at `loc` (within directory `dir_head`) deleted and
    /// releases its data chain. Idempotent: deleting an already-deleted
    /// record is a no-op.
    pub fn mark_deleted(&self, dir_head: u16, loc: EntryLoc) -> Result<()> {
        let mut entry = self.blocks().read_record(loc.block, loc.slot)?;
        if is_deleted(&entry) {
            return Ok(());
        }

        let was_last = is_last(&entry);
        let chain_head = entry.first_cluster_low.get();

        entry.attributes = attr::DELETED;
        entry.name[0] = b'_';
        if was_last {
            set_last(&mut entry, false);
        }
        self.blocks().write_record(loc.block, loc.slot, &entry)?;

        if was_last {
            if let Some(prev) = self.previous_entry(dir_head, loc)? {
                let mut prev_entry = self.blocks().read_record(prev.block, prev.slot)?;
                set_last(&mut prev_entry, true);
                self.blocks().write_record(prev.block, prev.slot, &prev_entry)?;
            }
        }

        if chain_head != END_OF_CHAIN {
            self.alloc().release_chain(chain_head)?;
        }
        Ok(())
    }

    /// Removes the entry at `loc`: for a directory, fails with NOT_EMPTY
    /// unless it is empty; otherwise releases its chain via `mark_deleted`.
    pub fn remove_entry(&self, dir_head: u16, loc: EntryLoc, entry: &DirEntry) -> Result<()> {
        if crate::is_directory(entry) && !self.is_directory_empty(entry.first_cluster_low.get())? {
            return Err(FsError::NotEmpty.into());
        }
        self.mark_deleted(dir_head, loc)
    }

    /// Walks the raw (unfiltered) sequence from `dir_head` up to (excluding)
    /// `target`, returning the location of the last non-deleted, non-empty
    /// record seen — used to shift the LAST sentinel backward on deletion.
    fn previous_entry(&self, dir_head: u16, target: EntryLoc) -> Result<Option<EntryLoc>> {
        let mut prev = None;
        let mut block = dir_head;
        let mut slot = 0u8;
        loop {
            if block == target.block && slot == target.slot {
                return Ok(prev);
            }
            if slot as usize >= RECORDS_PER_BLOCK {
                block = self.alloc().next(block)?;
                slot = 0;
                continue;
            }
            let entry = self.blocks().read_record(block, slot)?;
            if !is_deleted(&entry) && !is_empty_record(&entry) {
                prev = Some(EntryLoc { block, slot });
            }
            slot += 1;
        }
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
    fn mkdir_sets_up_dot_and_dotdot() {
        let fs = fresh();
        fs.mkdir(crate::ROOT_BLOCK, "a").unwrap();
        let (_, a) = fs.find_entry(crate::ROOT_BLOCK, &encode_name("a").unwrap()).unwrap().unwrap();
        let a_block = a.first_cluster_low.get();

        let dot = fs.blocks().read_record(a_block, 0).unwrap();
        assert_eq!(dot.first_cluster_low.get(), a_block);
        assert!(!is_last(&dot));

        let dotdot = fs.blocks().read_record(a_block, 1).unwrap();
        assert_eq!(dotdot.first_cluster_low.get(), crate::ROOT_BLOCK);
        assert!(is_last(&dotdot));

        assert!(fs.is_directory_empty(a_block).unwrap());
    }

    #[test]
    fn sentinel_shifts_back_on_delete() {
        let fs = fresh();
        fs.mkdir(crate::ROOT_BLOCK, "a").unwrap();
        let (loc, _) = fs.find_entry(crate::ROOT_BLOCK, &encode_name("a").unwrap()).unwrap().unwrap();
        fs.mark_deleted(crate::ROOT_BLOCK, loc).unwrap();

        let dotdot = fs.blocks().read_record(crate::ROOT_BLOCK, 1).unwrap();
        assert!(is_last(&dotdot));
    }

    #[test]
    fn mark_deleted_is_idempotent() {
        let fs = fresh();
        fs.mkdir(crate::ROOT_BLOCK, "a").unwrap();
        let (loc, _) = fs.find_entry(crate::ROOT_BLOCK, &encode_name("a").unwrap()).unwrap().unwrap();
        fs.mark_deleted(crate::ROOT_BLOCK, loc).unwrap();
        fs.mark_deleted(crate::ROOT_BLOCK, loc).unwrap();
    }

    #[test]
    fn name_collision_is_rejected() {
        let fs = fresh();
        fs.mkdir(crate::ROOT_BLOCK, "a").unwrap();
        assert!(matches!(
            fs.mkdir(crate::ROOT_BLOCK, "a").unwrap_err(),
            tinyfat_err::Error::Fs(FsError::NameExists)
        ));
    }

    #[test]
    fn sixteenth_entry_extends_the_chain() {
        let fs = fresh();
        for i in 0..14 {
            fs.mkdir(crate::ROOT_BLOCK, &format!("D{i}")).unwrap();
        }
        // root now holds ".", "..", and 14 directories = 16 slots, block 0 full.
        let before = fs.alloc().next(crate::ROOT_BLOCK).unwrap();
        assert_eq!(before, END_OF_CHAIN);

        fs.mkdir(crate::ROOT_BLOCK, "OVERFLOW").unwrap();
        let next_block = fs.alloc().next(crate::ROOT_BLOCK).unwrap();
        assert_ne!(next_block, END_OF_CHAIN);

        let overflow = fs.blocks().read_record(next_block, 0).unwrap();
        assert!(is_last(&overflow));

        let former_last = fs.blocks().read_record(crate::ROOT_BLOCK, 15).unwrap();
        assert!(!is_last(&former_last));
    }
}
