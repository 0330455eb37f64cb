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

pub use tinyfat_err::*;

/// A fixed-size, randomly addressable byte region backing a file system image.
///
/// Implementors own the region exclusively; callers never see the underlying
/// bytes directly, only through `read`/`write` at an absolute offset.
pub trait DataStorage {
    fn read(&self, offset: u64, buffer: &mut [u8]) -> Result<()>;

    fn write(&self, offset: u64, buffer: &[u8]) -> Result<()>;

    /// Total addressable size of the region, in bytes.
    fn len(&self) -> u64;

    /// Zero the entire region.
    fn zero(&self) -> Result<()> {
        let len = self.len();
        let chunk = vec![0u8; 64 * 1024];
        let mut offset = 0u64;
        while offset < len {
            let n = chunk.len().min((len - offset) as usize);
            self.write(offset, &chunk[..n])?;
            offset += n as u64;
        }
        Ok(())
    }
}
