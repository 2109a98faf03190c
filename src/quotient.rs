//! Space-efficient probabilistic data structure to test for membership in a set.

use crate::packed_vec::PackedVec;
use crate::util;
use crate::SipHasherBuilder;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::error;
use std::f64::consts;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

const OCCUPIED_BIT: u64 = 0b001;
const CONTINUATION_BIT: u64 = 0b010;
const SHIFTED_BIT: u64 = 0b100;
const FLAG_BITS: u8 = 3;

/// The errors that can occur when constructing or modifying a `QuotientFilter`.
///
/// # Examples
///
/// ```
/// use quotient_filter::{Error, QuotientFilter};
///
/// assert_eq!(
///     QuotientFilter::<String>::new(0, 4).unwrap_err(),
///     Error::InvalidConfiguration,
/// );
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The requested quotient and remainder widths are unusable: either width is zero, or
    /// their sum exceeds the 64 bits produced by the hash function.
    InvalidConfiguration,
    /// Every slot of the filter holds a remainder, so no further element can be inserted.
    /// The filter is left unchanged.
    FilterFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration => write!(f, "invalid quotient filter configuration"),
            Error::FilterFull => write!(f, "quotient filter is full"),
        }
    }
}

impl error::Error for Error {}

// A decoded view of one slot of the filter. The backing storage keeps the remainder and
// the three metadata flags in two parallel `PackedVec`s.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Slot {
    remainder: u64,
    // set when this index is the canonical slot of some stored element
    is_occupied: bool,
    // set when this slot does not hold the first remainder of its run
    is_continuation: bool,
    // set when the remainder stored here is not in its canonical slot
    is_shifted: bool,
}

impl Slot {
    fn decode(remainder: u64, flags: u64) -> Self {
        Slot {
            remainder,
            is_occupied: flags & OCCUPIED_BIT != 0,
            is_continuation: flags & CONTINUATION_BIT != 0,
            is_shifted: flags & SHIFTED_BIT != 0,
        }
    }

    fn flags(&self) -> u64 {
        let mut flags = 0;
        if self.is_occupied {
            flags |= OCCUPIED_BIT;
        }
        if self.is_continuation {
            flags |= CONTINUATION_BIT;
        }
        if self.is_shifted {
            flags |= SHIFTED_BIT;
        }
        flags
    }

    fn is_empty(&self) -> bool {
        !self.is_occupied && !self.is_continuation && !self.is_shifted
    }
}

// Result of locating the run of a quotient: the index of the run's first slot, the number
// of run heads from the cluster start through that slot, and the number of occupied slots
// from the cluster start through that slot. The counts drive the shifted-bit bookkeeping
// during removal.
struct RunScan {
    start: usize,
    runs: usize,
    occupied: usize,
}

/// A space-efficient probabilistic data structure to test for membership in a set, with
/// support for removing elements.
///
/// A quotient filter is essentially a compact open-addressing hash table. Each element is
/// hashed to a 64-bit fingerprint whose low `remainder_bits` bits are the remainder and
/// whose next `quotient_bits` bits are the quotient. The quotient is the index of the
/// element's canonical slot, and the remainder is the value actually stored. Elements
/// whose quotients collide are stored in a contiguous group of slots called a run, sorted
/// by remainder, and adjacent runs coalesce into clusters. Three bits of metadata per slot
/// (`is_occupied`, `is_continuation`, `is_shifted`) make every stored remainder reachable
/// from its canonical slot, so a negative query is always exact: the filter has false
/// positives but no false negatives.
///
/// The filter has a fixed capacity of `2^quotient_bits` slots and does not resize; once
/// every slot is filled, further insertions fail with [`Error::FilterFull`] and the caller
/// must rebuild with a larger `quotient_bits` if growth is required.
///
/// # Examples
///
/// ```
/// use quotient_filter::QuotientFilter;
///
/// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
///
/// assert!(!filter.contains("foo"));
/// filter.insert("foo").unwrap();
/// assert!(filter.contains("foo"));
///
/// assert!(filter.remove("foo"));
/// assert!(!filter.contains("foo"));
///
/// assert_eq!(filter.quotient_bits(), 8);
/// assert_eq!(filter.remainder_bits(), 4);
/// assert_eq!(filter.capacity(), 256);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct QuotientFilter<T, B = SipHasherBuilder> {
    quotient_bits: u8,
    remainder_bits: u8,
    quotient_mask: u64,
    remainder_mask: u64,
    remainders: PackedVec,
    flags: PackedVec,
    hash_builder: B,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> QuotientFilter<T> {
    /// Constructs a new, empty `QuotientFilter` with the specified number of quotient and
    /// remainder bits. The filter will have `2^quotient_bits` slots, each storing a
    /// `remainder_bits`-bit remainder.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if `quotient_bits` is 0, `remainder_bits` is
    /// 0, or `quotient_bits + remainder_bits` is greater than 64.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::new(8, 4).unwrap();
    /// assert_eq!(filter.capacity(), 256);
    /// ```
    pub fn new(quotient_bits: u8, remainder_bits: u8) -> Result<Self, Error> {
        Self::with_hasher(quotient_bits, remainder_bits, SipHasherBuilder::from_entropy())
    }

    /// Constructs a new, empty `QuotientFilter` that can store `item_count` items with an
    /// estimated false positive probability of less than `fpp`. The ideal fullness of a
    /// quotient filter is 50%, so the constructed filter will have `2 * item_count` slots.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if `item_count` is 0, if `fpp` is not in the
    /// range `(0, 1)`, or if the derived quotient and remainder widths exceed 64 bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::from_fpp(100, 0.05).unwrap();
    /// assert_eq!(filter.quotient_bits(), 8);
    /// assert_eq!(filter.remainder_bits(), 4);
    /// ```
    pub fn from_fpp(item_count: usize, fpp: f64) -> Result<Self, Error> {
        Self::from_fpp_with_hasher(item_count, fpp, SipHasherBuilder::from_entropy())
    }
}

impl<T, B> QuotientFilter<T, B>
where
    B: BuildHasher,
{
    /// Constructs a new, empty `QuotientFilter` with the specified number of quotient and
    /// remainder bits, and a hasher builder for hashing elements. The hasher builder must
    /// be deterministic: hashing the same element twice must yield the same fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if `quotient_bits` is 0, `remainder_bits` is
    /// 0, or `quotient_bits + remainder_bits` is greater than 64.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::{QuotientFilter, SipHasherBuilder};
    ///
    /// let filter =
    ///     QuotientFilter::<String, _>::with_hasher(8, 4, SipHasherBuilder::from_seed(0, 0));
    /// assert!(filter.is_ok());
    /// ```
    pub fn with_hasher(quotient_bits: u8, remainder_bits: u8, hash_builder: B) -> Result<Self, Error> {
        if quotient_bits == 0 || remainder_bits == 0 {
            return Err(Error::InvalidConfiguration);
        }
        if u16::from(quotient_bits) + u16::from(remainder_bits) > 64 {
            return Err(Error::InvalidConfiguration);
        }
        let capacity = 1usize << quotient_bits;
        Ok(QuotientFilter {
            quotient_bits,
            remainder_bits,
            quotient_mask: (1 << quotient_bits) - 1,
            remainder_mask: (1 << remainder_bits) - 1,
            remainders: PackedVec::new(remainder_bits, capacity),
            flags: PackedVec::new(FLAG_BITS, capacity),
            hash_builder,
            len: 0,
            _marker: PhantomData,
        })
    }

    /// Constructs a new, empty `QuotientFilter` that can store `item_count` items with an
    /// estimated false positive probability of less than `fpp`, and a hasher builder for
    /// hashing elements.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfiguration` if `item_count` is 0, if `fpp` is not in the
    /// range `(0, 1)`, or if the derived quotient and remainder widths exceed 64 bits.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::{QuotientFilter, SipHasherBuilder};
    ///
    /// let filter = QuotientFilter::<String, _>::from_fpp_with_hasher(
    ///     100,
    ///     0.05,
    ///     SipHasherBuilder::from_seed(0, 0),
    /// );
    /// assert!(filter.is_ok());
    /// ```
    pub fn from_fpp_with_hasher(item_count: usize, fpp: f64, hash_builder: B) -> Result<Self, Error> {
        if item_count == 0 || fpp <= 0.0 || fpp >= 1.0 {
            return Err(Error::InvalidConfiguration);
        }
        let quotient_bits = ((item_count * 2) as f64).log2().ceil() as u8;
        let remainder_bits = (-0.5 / (1.0 - fpp).ln()).log2().ceil().max(1.0) as u8;
        Self::with_hasher(quotient_bits, remainder_bits, hash_builder)
    }

    fn quotient_and_remainder(&self, hash: u64) -> (usize, u64) {
        (
            ((hash >> self.remainder_bits) & self.quotient_mask) as usize,
            hash & self.remainder_mask,
        )
    }

    fn next_index(&self, index: usize) -> usize {
        if index == self.capacity() - 1 {
            0
        } else {
            index + 1
        }
    }

    fn prev_index(&self, index: usize) -> usize {
        if index == 0 {
            self.capacity() - 1
        } else {
            index - 1
        }
    }

    fn slot(&self, index: usize) -> Slot {
        Slot::decode(self.remainders.get(index), self.flags.get(index))
    }

    fn set_slot(&mut self, index: usize, slot: Slot) {
        self.remainders.set(index, slot.remainder);
        self.flags.set(index, slot.flags());
    }

    fn clear_slot(&mut self, index: usize) {
        self.remainders.set(index, 0);
        self.flags.set(index, 0);
    }

    // Locates the run of `quotient`. The caller must ensure `is_occupied(quotient)` holds,
    // except during insertion of a new run, where the freshly set occupied bit makes the
    // scan land on the slot the new run must claim.
    fn scan_run(&self, quotient: usize) -> RunScan {
        // walk left to the cluster start, counting the occupied slots on the way
        let mut index = quotient;
        let mut target = 0;
        loop {
            let slot = self.slot(index);
            if slot.is_occupied {
                target += 1;
            }
            if !slot.is_shifted {
                break;
            }
            index = self.prev_index(index);
        }

        // walk right from the cluster start, consuming one run head per occupied slot
        let mut runs = 0;
        let mut occupied = 0;
        loop {
            let slot = self.slot(index);
            if slot.is_occupied {
                occupied += 1;
            }
            if !slot.is_continuation {
                runs += 1;
            }
            if runs == target {
                break;
            }
            index = self.next_index(index);
        }

        RunScan {
            start: index,
            runs,
            occupied,
        }
    }

    fn contains_fingerprint(&self, quotient: usize, remainder: u64) -> bool {
        if !self.slot(quotient).is_occupied {
            return false;
        }

        let mut index = self.scan_run(quotient).start;
        loop {
            let slot = self.slot(index);
            match slot.remainder.cmp(&remainder) {
                Ordering::Equal => return true,
                // remainders in a run are sorted, so the rest of the run is larger
                Ordering::Greater => return false,
                Ordering::Less => {
                    index = self.next_index(index);
                    if !self.slot(index).is_continuation {
                        return false;
                    }
                }
            }
        }
    }

    // Places `slot` at `index` and shifts the remainder of the cluster one position right,
    // stopping once an empty slot absorbs the chain. Occupied bits stay with their index;
    // every displaced slot becomes shifted.
    fn insert_and_shift(&mut self, mut index: usize, mut slot: Slot) {
        loop {
            let mut displaced = self.slot(index);
            let was_empty = displaced.is_empty();

            slot.is_occupied = displaced.is_occupied;
            self.set_slot(index, slot);

            if was_empty {
                break;
            }

            displaced.is_occupied = false;
            displaced.is_shifted = true;
            slot = displaced;
            index = self.next_index(index);
        }
    }

    /// Inserts an element into the quotient filter. Inserting an element whose fingerprint
    /// is already present leaves the filter unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::FilterFull` if every slot of the filter is already filled. The
    /// filter is not modified in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// filter.insert("foo").unwrap();
    /// assert!(filter.contains("foo"));
    /// ```
    pub fn insert<U>(&mut self, item: &U) -> Result<(), Error>
    where
        T: Borrow<U>,
        U: Hash + ?Sized,
    {
        if self.len == self.capacity() {
            return Err(Error::FilterFull);
        }

        let (quotient, remainder) =
            self.quotient_and_remainder(util::hash(&self.hash_builder, &item));
        let canonical = self.slot(quotient);

        if canonical.is_empty() {
            self.set_slot(
                quotient,
                Slot {
                    remainder,
                    is_occupied: true,
                    is_continuation: false,
                    is_shifted: false,
                },
            );
            self.len += 1;
            return Ok(());
        }

        if self.contains_fingerprint(quotient, remainder) {
            return Ok(());
        }

        // mark the canonical slot before locating the run so the scan resolves to the
        // position the new run must claim
        let starts_new_run = !canonical.is_occupied;
        if starts_new_run {
            let mut slot = canonical;
            slot.is_occupied = true;
            self.set_slot(quotient, slot);
        }

        let run_start = self.scan_run(quotient).start;
        let mut index = run_start;
        let mut new_slot = Slot {
            remainder,
            is_occupied: false,
            is_continuation: false,
            is_shifted: false,
        };

        if !starts_new_run {
            // find the sorted position within the run
            loop {
                let slot = self.slot(index);
                if remainder < slot.remainder {
                    break;
                }
                index = self.next_index(index);
                if !self.slot(index).is_continuation {
                    break;
                }
            }

            if index == run_start {
                // the old run head shifts right and becomes a continuation
                let mut head = self.slot(run_start);
                head.is_continuation = true;
                self.set_slot(run_start, head);
            } else {
                new_slot.is_continuation = true;
            }
        }

        new_slot.is_shifted = index != quotient;
        self.insert_and_shift(index, new_slot);
        self.len += 1;
        Ok(())
    }

    /// Checks if an element is possibly in the quotient filter. A `true` result may be a
    /// false positive caused by a fingerprint collision, but a `false` result is always
    /// exact.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// assert!(!filter.contains("foo"));
    /// filter.insert("foo").unwrap();
    /// assert!(filter.contains("foo"));
    /// ```
    pub fn contains<U>(&self, item: &U) -> bool
    where
        T: Borrow<U>,
        U: Hash + ?Sized,
    {
        let (quotient, remainder) =
            self.quotient_and_remainder(util::hash(&self.hash_builder, &item));
        self.contains_fingerprint(quotient, remainder)
    }

    /// Removes an element from the quotient filter, returning `true` if its fingerprint
    /// was present. Note that removing an element also removes every other element that
    /// shares its fingerprint; elements that were never inserted but collide with a stored
    /// fingerprint are reported as removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// filter.insert("foo").unwrap();
    /// assert!(filter.remove("foo"));
    /// assert!(!filter.remove("foo"));
    /// assert!(!filter.contains("foo"));
    /// ```
    pub fn remove<U>(&mut self, item: &U) -> bool
    where
        T: Borrow<U>,
        U: Hash + ?Sized,
    {
        let (quotient, remainder) =
            self.quotient_and_remainder(util::hash(&self.hash_builder, &item));

        if !self.slot(quotient).is_occupied {
            return false;
        }

        let scan = self.scan_run(quotient);
        let mut index = scan.start;
        let mut runs = scan.runs;
        let mut occupied = scan.occupied;

        // find the remainder within the run
        let mut slot = self.slot(index);
        loop {
            match slot.remainder.cmp(&remainder) {
                Ordering::Equal => break,
                // remainders in a run are sorted, so the rest of the run is larger
                Ordering::Greater => return false,
                Ordering::Less => {
                    index = self.next_index(index);
                    slot = self.slot(index);
                    if slot.is_occupied {
                        occupied += 1;
                    }
                    if !slot.is_continuation {
                        return false;
                    }
                }
            }
        }

        let removed_head = !slot.is_continuation;
        let mut next = self.next_index(index);

        // the run vanishes when its head is removed with no continuation following it, and
        // its canonical slot must stop advertising a run even when nothing needs shifting
        if removed_head && !self.slot(next).is_continuation {
            let mut canonical = self.slot(quotient);
            canonical.is_occupied = false;
            self.set_slot(quotient, canonical);
        }

        // re-read both slots: when the cluster wraps the whole table, the canonical slot
        // can coincide with the slots touched above
        let mut carry_occupied = self.slot(index).is_occupied;
        let mut moved = self.slot(next);
        self.clear_slot(index);

        // close the gap: shift every following continuation or shifted slot of the cluster
        // one position left, stopping at an empty slot or at the start of the next cluster
        let mut first_moved = removed_head;
        while moved.is_continuation || moved.is_shifted {
            self.clear_slot(next);

            let mut placed = moved;
            if placed.is_continuation {
                if first_moved {
                    // promoted to head of the removed element's run
                    placed.is_continuation = false;
                }
            } else {
                runs += 1;
            }
            first_moved = false;

            // a run head settles unshifted when it lands in its canonical slot, which is
            // the `runs`-th occupied slot of the cluster
            placed.is_shifted = !(carry_occupied && occupied == runs);
            placed.is_occupied = carry_occupied;
            self.set_slot(index, placed);

            if moved.is_occupied {
                occupied += 1;
            }
            carry_occupied = moved.is_occupied;

            index = next;
            next = self.next_index(next);
            moved = self.slot(next);
        }

        self.len -= 1;
        true
    }

    /// Clears the quotient filter, removing all elements.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// filter.insert("foo").unwrap();
    /// filter.clear();
    ///
    /// assert!(!filter.contains("foo"));
    /// ```
    pub fn clear(&mut self) {
        self.remainders.clear();
        self.flags.clear();
        self.len = 0;
    }

    /// Returns the number of elements in the quotient filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// filter.insert("foo").unwrap();
    /// assert_eq!(filter.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the quotient filter is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// assert!(filter.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots in the quotient filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// assert_eq!(filter.capacity(), 256);
    /// ```
    pub fn capacity(&self) -> usize {
        1 << self.quotient_bits
    }

    /// Returns the number of quotient bits in the fingerprint of an element.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// assert_eq!(filter.quotient_bits(), 8);
    /// ```
    pub fn quotient_bits(&self) -> u8 {
        self.quotient_bits
    }

    /// Returns the number of remainder bits in the fingerprint of an element.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let filter = QuotientFilter::<String>::new(8, 4).unwrap();
    ///
    /// assert_eq!(filter.remainder_bits(), 4);
    /// ```
    pub fn remainder_bits(&self) -> u8 {
        self.remainder_bits
    }

    /// Returns the estimated false positive probability of the quotient filter. This value
    /// will increase as more elements are added.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::QuotientFilter;
    ///
    /// let mut filter = QuotientFilter::<String>::from_fpp(100, 0.05).unwrap();
    /// assert!(filter.estimate_fpp() < 1e-15);
    ///
    /// filter.insert("foo").unwrap();
    /// assert!(filter.estimate_fpp() > 1e-15);
    /// assert!(filter.estimate_fpp() < 0.05);
    /// ```
    pub fn estimate_fpp(&self) -> f64 {
        let fill_ratio = self.len as f64 / self.capacity() as f64;
        1.0 - consts::E.powf(-fill_ratio / 2f64.powf(f64::from(self.remainder_bits)))
    }

    /// Returns a reference to the quotient filter's hasher builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::{QuotientFilter, SipHasherBuilder};
    ///
    /// let hash_builder = SipHasherBuilder::from_seed(0, 0);
    /// let filter = QuotientFilter::<String, _>::with_hasher(8, 4, hash_builder).unwrap();
    ///
    /// assert_eq!(filter.hasher(), &hash_builder);
    /// ```
    pub fn hasher(&self) -> &B {
        &self.hash_builder
    }
}

impl<T, B> fmt::Debug for QuotientFilter<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (remainder, flags)) in self.remainders.iter().zip(self.flags.iter()).enumerate()
        {
            write!(f, "{}|{}:{:03b} ", index, remainder, flags)?;
        }
        Ok(())
    }
}
