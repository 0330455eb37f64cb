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

use chrono::{Datelike, Local, Timelike};

use crate::dir_entry::DirEntry;

/// A packed date/time pair, encoded per the directory record's date/time
/// field layout: date is {year-1980:7, month:4, day:5}, time is
/// {hour:5, minute:6, second/2:5}.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub date: u16,
    pub time: u16,
}

impl Timestamp {
    /// Captures the current wall-clock time.
    pub fn now() -> Self {
        let now = Local::now();
        Self::encode(
            now.year(),
            now.month() as u8,
            now.day() as u8,
            now.hour() as u8,
            now.minute() as u8,
            now.second() as u8,
        )
    }

    pub fn encode(year: i32, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year_offset = (year - 1980).clamp(0, 0x7F) as u16;
        let date = (year_offset << 9) | ((month as u16 & 0x0F) << 5) | (day as u16 & 0x1F);
        let time = ((hour as u16 & 0x1F) << 11)
            | ((minute as u16 & 0x3F) << 5)
            | ((second as u16 / 2) & 0x1F);
        Self { date, time }
    }

    /// Decodes back to (year, month, day, hour, minute, second). Seconds are
    /// only stored at 2-second resolution.
    pub fn decode(&self) -> (i32, u8, u8, u8, u8, u8) {
        let year = 1980 + ((self.date >> 9) & 0x7F) as i32;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let day = (self.date & 0x1F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let second = ((self.time & 0x1F) * 2) as u8;
        (year, month, day, hour, minute, second)
    }

    /// Stamps create/access/write fields on `entry` all at once, as the
    /// reference implementation does whenever a record is first written.
    pub fn apply(&self, entry: &mut DirEntry) {
        entry.create_time_tenths = 0;
        entry.create_time.set(self.time);
        entry.create_date.set(self.date);
        entry.last_access_date.set(self.date);
        entry.last_write_time.set(self.time);
        entry.last_write_date.set(self.date);
    }

    /// Updates only the access/write fields, leaving creation time intact.
    pub fn apply_as_touch(&self, entry: &mut DirEntry) {
        entry.last_access_date.set(self.date);
        entry.last_write_time.set(self.time);
        entry.last_write_date.set(self.date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_two_second_resolution() {
        let ts = Timestamp::encode(2024, 3, 17, 13, 45, 30);
        let (year, month, day, hour, minute, second) = ts.decode();
        assert_eq!((year, month, day, hour, minute, second), (2024, 3, 17, 13, 45, 30));
    }

    #[test]
    fn odd_seconds_round_down() {
        let ts = Timestamp::encode(2000, 1, 1, 0, 0, 31);
        let (.., second) = ts.decode();
        assert_eq!(second, 30);
    }

    #[test]
    fn year_domain_is_clamped() {
        let ts = Timestamp::encode(1970, 1, 1, 0, 0, 0);
        let (year, ..) = ts.decode();
        assert_eq!(year, 1980);
    }
}
