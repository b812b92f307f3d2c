#![no_std]

//! Zero-allocation intrusive containers for kernel data structures that must
//! not touch a heap: the scheduler's ready/sleep lists and the process/file
//! reference graph.
//!
//! `IntrusiveList` links elements through a field embedded in the element
//! itself rather than through separately-allocated nodes, and `ArcIntrusive`
//! reference-counts through an atomic embedded in the managed object rather
//! than through a separate control block. Both require `unsafe` at the
//! construction boundary: the caller must guarantee the referenced objects
//! outlive the list/pointer, exactly as the kernel's scheduler data
//! structures already have to.

pub mod list;
pub mod rc;

pub use list::{IntrusiveList, Link};
pub use rc::{ArcIntrusive, IntrusiveRefCounted};
