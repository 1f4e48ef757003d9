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

//! Scoped rendezvous primitives usable from host threads and accelerator
//! execution units, built on the visibility domains of `blue_scope`.

#![cfg_attr(not(test), no_std)]

pub mod barrier;
pub mod error;
#[cfg(feature = "latch")]
pub mod latch;

pub use barrier::{ArrivalToken, Barrier, BlockBarrier, DeviceBarrier, SystemBarrier};
pub use error::{code, Error};
#[cfg(feature = "latch")]
pub use latch::Latch;
