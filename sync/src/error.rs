// Copyright (c) 2025 vivo Mobile Communication Co., Ltd.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(dead_code)]

use core::fmt;

pub mod code {
    pub const EOK: super::Error = super::Error(0);
    pub const ETIMEDOUT: super::Error = super::Error(-libc::ETIMEDOUT);
    pub const EINVAL: super::Error = super::Error(-libc::EINVAL);
    pub const EAGAIN: super::Error = super::Error(-libc::EAGAIN);
}

/// Errno-style error carried by the bounded-wait surface.
///
/// Contract violations (bad participant counts) are asserted, never
/// reported through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Error(i32);

impl Error {
    pub fn from_errno(errno: i32) -> Error {
        Error(errno)
    }

    pub fn to_errno(self) -> i32 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        match *self {
            code::EOK => "OK",
            code::ETIMEDOUT => "Timed out",
            code::EINVAL => "Invalid argument",
            code::EAGAIN => "Try again",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error({}): {}", self.0, self.name())
    }
}
