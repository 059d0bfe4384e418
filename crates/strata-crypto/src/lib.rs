//! Hashing primitives for Strata.
//!
//! Every stored object is named by a domain-separated BLAKE3 hash so that a
//! blob and a tree with identical bytes never collide.

pub mod hasher;

pub use hasher::ContentHasher;
