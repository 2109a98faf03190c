use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use siphasher::sip::SipHasher;
use std::hash::BuildHasher;
use std::hash::{Hash, Hasher};
use std::{cmp, fmt};

/// The default hash builder for the quotient filter.
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy)]
pub struct SipHasherBuilder {
    k0: u64,
    k1: u64,
    hasher: SipHasher,
}

impl SipHasherBuilder {
    /// Constructs a new `SipHasherBuilder` that uses the thread-local RNG to seed itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_entropy();
    /// ```
    pub fn from_entropy() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_seed(rng.gen(), rng.gen())
    }

    /// Constructs a new `SipHasherBuilder` that is seeded with the given keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use quotient_filter::SipHasherBuilder;
    ///
    /// let hash_builder = SipHasherBuilder::from_seed(0, 0);
    /// ```
    pub fn from_seed(k0: u64, k1: u64) -> Self {
        SipHasherBuilder {
            k0,
            k1,
            hasher: SipHasher::new_with_keys(k0, k1),
        }
    }
}

impl fmt::Debug for SipHasherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipHasherBuilder")
            .field("k0", &self.k0)
            .field("k1", &self.k1)
            .finish()
    }
}

impl cmp::PartialEq for SipHasherBuilder {
    fn eq(&self, other: &SipHasherBuilder) -> bool {
        self.k0 == other.k0 && self.k1 == other.k1
    }
}

impl BuildHasher for SipHasherBuilder {
    type Hasher = SipHasher;

    #[inline]
    fn build_hasher(&self) -> SipHasher {
        self.hasher
    }
}

pub fn hash(hash_builder: &impl BuildHasher, item: &(impl Hash + ?Sized)) -> u64 {
    let mut hasher = hash_builder.build_hasher();
    item.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::{hash, SipHasherBuilder};

    #[test]
    fn test_hash_deterministic() {
        let hash_builder = SipHasherBuilder::from_seed(0, 0);
        assert_eq!(hash(&hash_builder, "foo"), hash(&hash_builder, "foo"));
    }

    #[test]
    fn test_seeds_change_hash() {
        let hash_builder_1 = SipHasherBuilder::from_seed(0, 0);
        let hash_builder_2 = SipHasherBuilder::from_seed(1, 1);
        assert_ne!(hash_builder_1, hash_builder_2);
        assert_ne!(hash(&hash_builder_1, "foo"), hash(&hash_builder_2, "foo"));
    }
}
