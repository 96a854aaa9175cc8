// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - question answering and index inspection commands

pub mod ask;
pub mod search;
pub mod status;
