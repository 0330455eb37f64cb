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

use crate::dir_entry::{encode_name, is_directory, DirEntry};
use crate::{EntryLoc, Filesystem, ROOT_BLOCK};

/// Splits a `/`-separated absolute path into its non-empty components.
/// `"/"`, `""`, and `"///"` all split to an empty list, meaning "the root".
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl<DS: DataStorage> Filesystem<DS> {
    /// Resolves `path` to the location and record of the entry it names.
    /// Returns `Ok(None)` for "not found" along any step, including when an
    /// intermediate component exists but is not a directory — higher-level
    /// callers decide whether that's NOT_FOUND or NOT_A_DIRECTORY.
    pub fn resolve(&self, path: &str) -> Result<Option<(EntryLoc, DirEntry)>> {
        let components = split_path(path);
        if components.is_empty() {
            let root = self.blocks().read_record(ROOT_BLOCK, 0)?;
            return Ok(Some((EntryLoc { block: ROOT_BLOCK, slot: 0 }, root)));
        }

        let mut dir_block = ROOT_BLOCK;
        let mut current = None;
        for (i, name) in components.iter().enumerate() {
            let name_bytes = encode_name(name)?;
            let found = self.find_entry(dir_block, &name_bytes)?;
            let (loc, entry) = match found {
                Some(found) => found,
                None => return Ok(None),
            };

            let is_final = i + 1 == components.len();
            if !is_final {
                if !is_directory(&entry) {
                    return Ok(None);
                }
                dir_block = entry.first_cluster_low.get();
            }
            current = Some((loc, entry));
        }
        Ok(current)
    }

    /// Resolves `path` and requires the result to be a directory, returning
    /// the block that holds its entries.
    pub fn resolve_dir(&self, path: &str) -> Result<u16> {
        let components = split_path(path);
        if components.is_empty() {
            return Ok(ROOT_BLOCK);
        }
        match self.resolve(path)? {
            Some((_, entry)) if is_directory(&entry) => Ok(entry.first_cluster_low.get()),
            Some(_) => Err(FsError::NotADirectory.into()),
            None => Err(FsError::NotFound.into()),
        }
    }

    /// Splits `path` into its resolved parent directory block and the final
    /// path component's name.
    fn split_parent<'p>(&self, path: &'p str) -> Result<(u16, &'p str)> {
        let components = split_path(path);
        let (parent, name) = components.split_at(components.len().saturating_sub(1));
        let name = name.first().copied().ok_or(FsError::NameTooLong)?;
        let parent_path = parent.join("/");
        Ok((self.resolve_dir(&format!("/{parent_path}"))?, name))
    }

    pub fn mkdir_path(&self, path: &str) -> Result<EntryLoc> {
        let (parent_block, name) = self.split_parent(path)?;
        self.mkdir(parent_block, name)
    }

    pub fn create_file_path(&self, path: &str) -> Result<EntryLoc> {
        let (parent_block, name) = self.split_parent(path)?;
        self.create_empty_file(parent_block, name)
    }

    pub fn remove_path(&self, path: &str) -> Result<()> {
        let (parent_block, name) = self.split_parent(path)?;
        let name_bytes = encode_name(name)?;
        let (loc, entry) = self
            .find_entry(parent_block, &name_bytes)?
            .ok_or(FsError::NotFound)?;
        self.remove_entry(parent_block, loc, &entry)
    }

    pub fn read_file_path(&self, path: &str, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let (_, entry) = self.resolve(path)?.ok_or(FsError::NotFound)?;
        if is_directory(&entry) {
            return Err(FsError::IsDirectory.into());
        }
        self.read_file(&entry, offset, buffer)
    }

    pub fn write_file_path(&self, path: &str, offset: u64, buffer: &[u8]) -> Result<usize> {
        let (loc, mut entry) = self.resolve(path)?.ok_or(FsError::NotFound)?;
        if is_directory(&entry) {
            return Err(FsError::IsDirectory.into());
        }
        self.write_file(loc, &mut entry, offset, buffer)
    }

    pub fn truncate_file_path(&self, path: &str, new_size: u32) -> Result<()> {
        let (loc, mut entry) = self.resolve(path)?.ok_or(FsError::NotFound)?;
        if is_directory(&entry) {
            return Err(FsError::IsDirectory.into());
        }
        self.truncate_file(loc, &mut entry, new_size)
    }

    /// Lists the live (non-deleted) entries of the directory at `path`.
    pub fn list_dir_path(&self, path: &str) -> Result<Vec<DirEntry>> {
        let block = self.resolve_dir(path)?;
        let mut out = Vec::new();
        for item in self.iter_dir(block) {
            let (_, entry) = item?;
            if !crate::is_deleted(&entry) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use tinyfat_ds_std::ImageBacking;

    use super::*;

    fn fresh() -> Filesystem<ImageBacking> {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test.img");
        let ds = ImageBacking::create(&file_path, crate::IMAGE_BYTES).unwrap();
        let fs = Filesystem::format(ds).unwrap();
        std::mem::forget(dir);
        fs
    }

    #[test]
    fn split_path_ignores_empty_components() {
        assert_eq!(split_path("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("/"), Vec::<&str>::new());
        assert_eq!(split_path(""), Vec::<&str>::new());
    }

    #[test]
    fn resolve_walks_nested_directories() {
        let fs = fresh();
        fs.mkdir_path("/a").unwrap();
        fs.mkdir_path("/a/b").unwrap();
        fs.create_file_path("/a/b/c.txt").unwrap();

        let (_, entry) = fs.resolve("/a/b/c.txt").unwrap().unwrap();
        assert_eq!(crate::dir_entry::decode_name(&entry.name), "c.txt");
    }

    #[test]
    fn resolve_through_a_file_component_is_not_found() {
        let fs = fresh();
        fs.create_file_path("/a.txt").unwrap();
        assert!(fs.resolve("/a.txt/b").unwrap().is_none());
    }

    #[test]
    fn remove_path_rejects_non_empty_directory() {
        let fs = fresh();
        fs.mkdir_path("/a").unwrap();
        fs.create_file_path("/a/f.txt").unwrap();
        assert!(matches!(
            fs.remove_path("/a").unwrap_err(),
            tinyfat_err::Error::Fs(FsError::NotEmpty)
        ));
    }

    #[test]
    fn write_read_and_remove_round_trip_by_path() {
        let fs = fresh();
        fs.create_file_path("/f.txt").unwrap();
        fs.write_file_path("/f.txt", 0, b"payload").unwrap();

        let mut out = vec![0u8; 7];
        fs.read_file_path("/f.txt", 0, &mut out).unwrap();
        assert_eq!(&out, b"payload");

        fs.remove_path("/f.txt").unwrap();
        assert!(fs.resolve("/f.txt").unwrap().is_none());
    }

    #[test]
    fn list_dir_path_skips_deleted_entries() {
        let fs = fresh();
        fs.create_file_path("/a.txt").unwrap();
        fs.create_file_path("/b.txt").unwrap();
        fs.remove_path("/a.txt").unwrap();

        let names: Vec<_> = fs
            .list_dir_path("/")
            .unwrap()
            .iter()
            .map(|e| crate::dir_entry::decode_name(&e.name))
            .collect();
        assert!(!names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"b.txt".to_string()));
    }
}
