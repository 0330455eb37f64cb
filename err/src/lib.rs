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

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("FS: {0}")]
    Fs(#[from] FsError),
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("no free block")]
    NoSpace,
    #[error("name already exists")]
    NameExists,
    #[error("name longer than 11 bytes")]
    NameTooLong,
    #[error("path component not found")]
    NotFound,
    #[error("path component is not a directory")]
    NotADirectory,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("operation requires a file, not a directory")]
    IsDirectory,
    #[error("extraction target already exists")]
    ExternalExists,
    #[error("allocation table or directory chain is inconsistent")]
    Corrupt,
}

pub type Result<T> = std::result::Result<T, Error>;
