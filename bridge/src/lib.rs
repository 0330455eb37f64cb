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

//! Exposes a mounted [`tinyfat_fs::Filesystem`] as a FUSE file system via
//! `fuser`. Inode numbers are synthesized from directory record locations:
//! inode 1 is reserved for the root, everything else packs `(block, slot)`
//! into a `u64`.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request,
};
use tinyfat_ds_std::ImageBacking;
use tinyfat_err::{Error, FsError};
use tinyfat_fs::{is_directory, DirEntry, EntryLoc, Filesystem, ROOT_BLOCK};

const ROOT_INODE: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

fn inode_of(loc: EntryLoc) -> u64 {
    if loc.block == ROOT_BLOCK && loc.slot == 0 {
        return ROOT_INODE;
    }
    ((loc.block as u64) << 4) | loc.slot as u64
}

fn loc_of(inode: u64) -> EntryLoc {
    if inode == ROOT_INODE {
        return EntryLoc { block: ROOT_BLOCK, slot: 0 };
    }
    EntryLoc {
        block: (inode >> 4) as u16,
        slot: (inode & 0xF) as u8,
    }
}

fn errno_of(err: &Error) -> i32 {
    match err {
        Error::Io(_) => libc::EIO,
        Error::Fs(fs_err) => match fs_err {
            FsError::NoSpace => libc::ENOSPC,
            FsError::NameExists | FsError::ExternalExists => libc::EEXIST,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::IsDirectory => libc::EISDIR,
            FsError::Corrupt => libc::EIO,
        },
    }
}

fn attr_of(inode: u64, entry: &DirEntry) -> FileAttr {
    let kind = if is_directory(entry) { FileType::Directory } else { FileType::RegularFile };
    let size = entry.size.get() as u64;
    let (year, month, day, hour, minute, second) = entry.last_write_date_time();
    let mtime = chrono_to_system_time(year, month, day, hour, minute, second);
    FileAttr {
        ino: inode,
        size,
        blocks: size.div_ceil(tinyfat_fs::BLOCK_BYTES as u64),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: if kind == FileType::Directory { 0o755 } else { 0o644 },
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: tinyfat_fs::BLOCK_BYTES as u32,
        flags: 0,
    }
}

fn chrono_to_system_time(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> SystemTime {
    use chrono::{NaiveDate, TimeZone, Utc};
    let naive = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32));
    match naive {
        Some(naive) => Utc.from_utc_datetime(&naive).into(),
        None => SystemTime::UNIX_EPOCH,
    }
}

/// Adapts a mounted [`Filesystem`] to the `fuser::Filesystem` trait.
pub struct TinyFatFuse {
    fs: Filesystem<ImageBacking>,
}

impl TinyFatFuse {
    pub fn new(fs: Filesystem<ImageBacking>) -> Self {
        Self { fs }
    }
}

impl FuseFilesystem for TinyFatFuse {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let parent_block = self.dir_block_of(parent);
        let Some(name) = name.to_str() else {
            return reply.error(libc::EINVAL);
        };
        let Ok(name_bytes) = tinyfat_fs::encode_name(name) else {
            return reply.error(libc::ENAMETOOLONG);
        };
        match self.fs.find_entry(parent_block, &name_bytes) {
            Ok(Some((loc, entry))) => reply.entry(&TTL, &attr_of(inode_of(loc), &entry), 0),
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let loc = loc_of(ino);
        match self.fs.read_record_at(loc) {
            Ok(entry) => reply.attr(&TTL, &attr_of(ino, &entry)),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let loc = loc_of(ino);
        let mut entry = match self.fs.read_record_at(loc) {
            Ok(entry) => entry,
            Err(e) => return reply.error(errno_of(&e)),
        };
        if let Some(size) = size {
            if let Err(e) = self.fs.truncate_file(loc, &mut entry, size as u32) {
                return reply.error(errno_of(&e));
            }
        }
        reply.attr(&TTL, &attr_of(ino, &entry));
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let dir_block = self.dir_block_of(ino);
        let entries: Vec<_> = match self.fs.iter_dir(dir_block).collect::<Result<Vec<_>, _>>() {
            Ok(entries) => entries,
            Err(e) => return reply.error(errno_of(&e)),
        };

        for (i, (loc, entry)) in entries.into_iter().enumerate().skip(offset as usize) {
            if tinyfat_fs::is_deleted(&entry) {
                continue;
            }
            let kind = if is_directory(&entry) { FileType::Directory } else { FileType::RegularFile };
            let name = tinyfat_fs::decode_name(&entry.name);
            if reply.add(inode_of(loc), (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn read(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, size: u32, _flags: i32, _lock: Option<u64>, reply: ReplyData) {
        let entry = match self.fs.read_record_at(loc_of(ino)) {
            Ok(entry) => entry,
            Err(e) => return reply.error(errno_of(&e)),
        };
        let mut buffer = vec![0u8; size as usize];
        match self.fs.read_file(&entry, offset as u64, &mut buffer) {
            Ok(n) => reply.data(&buffer[..n]),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyWrite,
    ) {
        let loc = loc_of(ino);
        let mut entry = match self.fs.read_record_at(loc) {
            Ok(entry) => entry,
            Err(e) => return reply.error(errno_of(&e)),
        };
        match self.fs.write_file(loc, &mut entry, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.fs.read_record_at(loc_of(ino)) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        let free = match self.fs.free_block_count() {
            Ok(free) => free,
            Err(e) => return reply.error(errno_of(&e)),
        };
        reply.statfs(
            tinyfat_fs::TOTAL_BLOCKS as u64,
            free,
            free,
            0,
            0,
            tinyfat_fs::BLOCK_BYTES as u32,
            tinyfat_fs::MAX_NAME_BYTES as u32,
            tinyfat_fs::BLOCK_BYTES as u32,
        );
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        if name != "user.attr" {
            return reply.error(libc::ENODATA);
        }
        let entry = match self.fs.read_record_at(loc_of(ino)) {
            Ok(entry) => entry,
            Err(e) => return reply.error(errno_of(&e)),
        };
        let value = entry.attributes.to_string();
        if size == 0 {
            reply.size(value.len() as u32);
        } else if (value.len() as u32) > size {
            reply.error(libc::ERANGE);
        } else {
            reply.data(value.as_bytes());
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        _ino: u64,
        name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        if name != "user.attr" {
            return reply.error(libc::ENOTSUP);
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let parent_block = self.dir_block_of(parent);
        let Some(name) = name.to_str() else {
            return reply.error(libc::EINVAL);
        };
        match self.fs.create_empty_file(parent_block, name) {
            Ok(loc) => match self.fs.read_record_at(loc) {
                Ok(entry) => reply.created(&TTL, &attr_of(inode_of(loc), &entry), 0, 0, 0),
                Err(e) => reply.error(errno_of(&e)),
            },
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn mkdir(&mut self, _req: &Request, parent: u64, name: &OsStr, _mode: u32, _umask: u32, reply: ReplyEntry) {
        let parent_block = self.dir_block_of(parent);
        let Some(name) = name.to_str() else {
            return reply.error(libc::EINVAL);
        };
        match self.fs.mkdir(parent_block, name) {
            Ok(loc) => match self.fs.read_record_at(loc) {
                Ok(entry) => reply.entry(&TTL, &attr_of(inode_of(loc), &entry), 0),
                Err(e) => reply.error(errno_of(&e)),
            },
            Err(e) => reply.error(errno_of(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_child(parent, name, reply)
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.remove_child(parent, name, reply)
    }
}

impl TinyFatFuse {
    fn dir_block_of(&self, ino: u64) -> u16 {
        if ino == ROOT_INODE {
            return ROOT_BLOCK;
        }
        match self.fs.read_record_at(loc_of(ino)) {
            Ok(entry) => entry.first_cluster_low.get(),
            Err(_) => ROOT_BLOCK,
        }
    }

    fn remove_child(&mut self, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_block = self.dir_block_of(parent);
        let Some(name) = name.to_str() else {
            return reply.error(libc::EINVAL);
        };
        let Ok(name_bytes) = tinyfat_fs::encode_name(name) else {
            return reply.error(libc::ENAMETOOLONG);
        };
        match self.fs.find_entry(parent_block, &name_bytes) {
            Ok(Some((loc, entry))) => match self.fs.remove_entry(parent_block, loc, &entry) {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(errno_of(&e)),
            },
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(errno_of(&e)),
        }
    }
}
