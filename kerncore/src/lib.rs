// Allow std-y things to be used in test. Note that this attribute is a bit of
// a trap for the programmer, because rust-analyzer by default seems to build
// things with test set. This means it's easy to introduce code incompatible
// with no_std without your editor hassling you about it. Beware.
#![cfg_attr(not(test), no_std)]

//! Portable, architecture-independent kernel logic: priority comparisons for
//! all three scheduler policies and path normalization. Nothing here touches
//! hardware, so it's built and tested under plain `std` the same way it runs
//! inside the `no_std` kernel.

pub mod path;
pub mod priority;

pub use priority::scheduling_order;
