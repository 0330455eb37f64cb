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

use tinyfat_err::{FsError, Result};
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

use crate::{Timestamp, MAX_NAME_BYTES};

/// Directory entry attribute bits.
pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
    pub const DELETED: u8 = 0xE5;
}

const NOT_LAST: u8 = 0x00;
const LAST: u8 = 0x01;

/// Packed 32-byte directory record: name, attributes, timestamps, starting
/// block and size. Sixteen of these make up one block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub last_flag: u8,
    pub create_time_tenths: u8,
    pub create_time: U16,
    pub create_date: U16,
    pub last_access_date: U16,
    pub first_cluster_high: U16,
    pub last_write_time: U16,
    pub last_write_date: U16,
    pub first_cluster_low: U16,
    pub size: U32,
}

const _: () = assert!(core::mem::size_of::<DirEntry>() == 32);

impl DirEntry {
    /// Decodes the last-write date/time fields to (year, month, day, hour,
    /// minute, second).
    pub fn last_write_date_time(&self) -> (i32, u8, u8, u8, u8, u8) {
        let ts = Timestamp {
            date: self.last_write_date.get(),
            time: self.last_write_time.get(),
        };
        ts.decode()
    }
}

pub fn is_empty_record(entry: &DirEntry) -> bool {
    entry.name[0] == 0
}

pub fn is_deleted(entry: &DirEntry) -> bool {
    entry.attributes == attr::DELETED || entry.name[0] == b'_'
}

pub fn is_last(entry: &DirEntry) -> bool {
    entry.last_flag == LAST
}

pub fn is_directory(entry: &DirEntry) -> bool {
    entry.attributes & attr::DIRECTORY != 0
}

/// Zero-pads `name` into an 11-byte fixed-width field. Callers must have
/// already checked `name.len() <= MAX_NAME_BYTES` via [`encode_name`].
fn pad_name(name: &str) -> [u8; MAX_NAME_BYTES] {
    let mut out = [0u8; MAX_NAME_BYTES];
    let bytes = name.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// Validates and zero-pads a user-supplied name into the fixed-width field.
/// Equality between names is fixed-width byte equality, not C-string
/// comparison (see DESIGN.md).
pub fn encode_name(name: &str) -> Result<[u8; MAX_NAME_BYTES]> {
    if name.is_empty() || name.as_bytes().len() > MAX_NAME_BYTES {
        return Err(FsError::NameTooLong.into());
    }
    Ok(pad_name(name))
}

/// Renders a stored name back to a display string, trimming the zero padding.
pub fn decode_name(name: &[u8; MAX_NAME_BYTES]) -> String {
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    String::from_utf8_lossy(&name[..end]).into_owned()
}

pub fn set_last(entry: &mut DirEntry, last: bool) {
    entry.last_flag = if last { LAST } else { NOT_LAST };
}

/// Builds the synthetic record representing the root directory itself: it is
/// its own parent, with first_cluster_low = ROOT_BLOCK for both "." and "..".
pub fn root_record(now: Timestamp) -> DirEntry {
    let mut entry = DirEntry {
        attributes: attr::DIRECTORY,
        ..Default::default()
    };
    entry.first_cluster_low.set(crate::ROOT_BLOCK);
    now.apply(&mut entry);
    entry
}
