//! # quotient-filter
//!
//! `quotient-filter` is a space-efficient probabilistic data structure to test for
//! membership in a set. A quotient filter stores a small fingerprint of each element
//! instead of the element itself, so lookups have a tunable false positive probability,
//! but never a false negative. Unlike a standard Bloom filter, a quotient filter also
//! supports removing elements and can be resized by rehashing its fingerprints.
//!
//! The filter hashes each element to a fingerprint that is split into a quotient, which
//! selects a canonical slot, and a remainder, which is the value stored. Colliding
//! remainders are kept in sorted runs that shift through neighboring slots, and three
//! metadata bits per slot keep every stored remainder reachable from its canonical slot.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! quotient-filter = "*"
//! ```
//!
//! ## Examples
//!
//! ```
//! use quotient_filter::QuotientFilter;
//!
//! let mut filter = QuotientFilter::<String>::from_fpp(100, 0.01).unwrap();
//!
//! filter.insert("foo").unwrap();
//! assert!(filter.contains("foo"));
//! assert!(!filter.contains("bar"));
//!
//! filter.remove("foo");
//! assert!(!filter.contains("foo"));
//! ```
//!
//! ## References
//!
//!  - [Don't Thrash: How to Cache Your Hash on Flash](https://dl.acm.org/citation.cfm?id=2350275)
//!  > Bender, Michael A., Martin Farach-Colton, Rob Johnson, Russell Kraner, Bradley C. Kuszmaul, Dzejla Medjedovic, Pablo Montes, Pradeep Shetty, Richard P. Spillane, and Erez Zadok. 2012. “Don’t Thrash: How to Cache Your Hash on Flash.” *Proc. VLDB Endow.* 5 (11): 1627–37. doi:[10.14778/2350229.2350275](https://doi.org/10.14778/2350229.2350275).
//!  - [Compact Hash Tables Using Bidirectional Linear Probing](https://ieeexplore.ieee.org/document/1676499)
//!  > Cleary, John G. 1984. “Compact Hash Tables Using Bidirectional Linear Probing.” *IEEE Trans. Comput.* 33 (9): 828–34. doi:[10.1109/TC.1984.1676499](https://doi.org/10.1109/TC.1984.1676499).

#![warn(missing_docs)]

pub mod packed_vec;
mod quotient;
mod util;

pub use crate::quotient::{Error, QuotientFilter};
pub use crate::util::SipHasherBuilder;
