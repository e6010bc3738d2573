//! Pool configuration parameters.

use crate::error::{PoolError, Result};

/// Configuration for a typed pool allocator.
///
/// Controls the first reservation, the growth ratio applied when the pool
/// runs dry, and the page granularity used to size blocks. Validated when
/// the pool is created; the first registrant's configuration is kept for
/// the lifetime of the (arena, type) pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Floor for the capacity reserved when a pool is created.
    ///
    /// Default: 1024 elements. A smaller requested capacity is raised to
    /// this floor; a larger one is honoured as-is.
    pub min_capacity: usize,

    /// Capacity multiplier applied when vending finds the pool full.
    ///
    /// Default: 2. Must be at least 2 so that exhaustion always at least
    /// doubles the pool.
    pub growth_factor: usize,

    /// Host page size in bytes, used to derive the block element unit.
    ///
    /// Default: [`DEFAULT_PAGE_SIZE`](Self::DEFAULT_PAGE_SIZE). The OS is
    /// never queried; set this with [`with_page_size`](Self::with_page_size)
    /// on hosts whose pages are not 4 KiB. Must be a power of two.
    pub page_size: usize,
}

impl PoolConfig {
    /// Default capacity floor.
    pub const DEFAULT_MIN_CAPACITY: usize = 1024;

    /// Default exhaustion growth ratio.
    pub const DEFAULT_GROWTH_FACTOR: usize = 2;

    /// Default page granularity: a portable stand-in for the host page
    /// size, matching the 4 KiB pages of common x86-64 and aarch64 hosts.
    pub const DEFAULT_PAGE_SIZE: usize = 4096;

    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self {
            min_capacity: Self::DEFAULT_MIN_CAPACITY,
            growth_factor: Self::DEFAULT_GROWTH_FACTOR,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the capacity floor.
    pub fn with_min_capacity(mut self, min_capacity: usize) -> Self {
        self.min_capacity = min_capacity;
        self
    }

    /// Set the exhaustion growth ratio.
    pub fn with_growth_factor(mut self, growth_factor: usize) -> Self {
        self.growth_factor = growth_factor;
        self
    }

    /// Set the page granularity.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Check the documented constraints.
    pub fn validate(&self) -> Result<()> {
        if self.growth_factor < 2 {
            return Err(PoolError::InvalidConfig {
                reason: format!("growth_factor must be >= 2 (got {})", self.growth_factor),
            });
        }
        if !self.page_size.is_power_of_two() {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "page_size must be a power of two (got {})",
                    self.page_size
                ),
            });
        }
        Ok(())
    }

    /// Number of elements every block holds a whole multiple of.
    ///
    /// One page worth of elements, and never less than one. Zero-sized
    /// elements use `page_size` as the unit.
    pub fn block_unit(&self, element_size: usize) -> usize {
        if element_size == 0 {
            return self.page_size.max(1);
        }
        (self.page_size / element_size).max(1)
    }

    /// Capacity to reserve for a pool created with `requested` elements.
    pub fn initial_capacity(&self, requested: usize) -> usize {
        requested.max(self.min_capacity)
    }

    /// Elements to add when vending finds a pool of `capacity` full.
    ///
    /// An empty pool grows to the floor; otherwise the pool grows by
    /// `capacity * (growth_factor - 1)`, so the new total is at least
    /// `growth_factor` times the old one.
    pub fn exhaustion_growth(&self, capacity: usize) -> usize {
        if capacity == 0 {
            return self.min_capacity.max(1);
        }
        capacity.saturating_mul(self.growth_factor.saturating_sub(1).max(1))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PoolConfig::new();
        assert_eq!(config.min_capacity, 1024);
        assert_eq!(config.growth_factor, 2);
        assert_eq!(config.page_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn block_unit_is_one_page_of_elements() {
        let config = PoolConfig::new();
        assert_eq!(config.block_unit(16), 256);
        assert_eq!(config.block_unit(24), 170);
        assert_eq!(config.block_unit(8192), 1);
        assert_eq!(config.block_unit(0), 4096);
    }

    #[test]
    fn page_size_override_rescales_block_unit() {
        let config = PoolConfig::new().with_page_size(16 * 1024);
        config.validate().unwrap();
        assert_eq!(config.block_unit(16), 1024);
        assert_eq!(config.block_unit(0), 16 * 1024);
    }

    #[test]
    fn initial_capacity_applies_floor() {
        let config = PoolConfig::new();
        assert_eq!(config.initial_capacity(10), 1024);
        assert_eq!(config.initial_capacity(5000), 5000);
    }

    #[test]
    fn exhaustion_growth_doubles_by_default() {
        let config = PoolConfig::new();
        assert_eq!(config.exhaustion_growth(0), 1024);
        assert_eq!(config.exhaustion_growth(1024), 1024);
        let triple = PoolConfig::new().with_growth_factor(3);
        assert_eq!(triple.exhaustion_growth(1024), 2048);
    }

    #[test]
    fn growth_factor_below_two_rejected() {
        let result = PoolConfig::new().with_growth_factor(1).validate();
        assert!(matches!(result, Err(PoolError::InvalidConfig { .. })));
    }

    #[test]
    fn non_power_of_two_page_rejected() {
        let result = PoolConfig::new().with_page_size(3000).validate();
        assert!(matches!(result, Err(PoolError::InvalidConfig { .. })));
    }
}
