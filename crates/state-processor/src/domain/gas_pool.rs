//! Block gas pool.

use crate::errors::GasPoolError;

/// Gas still available to the transactions of a block.
///
/// Seeded with the block gas limit. Engines debit it before execution and
/// credit back the unused remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasPool(u64);

impl GasPool {
    /// Creates a pool holding `gas`.
    #[must_use]
    pub const fn new(gas: u64) -> Self {
        Self(gas)
    }

    /// Makes gas available for execution.
    pub fn add_gas(&mut self, amount: u64) -> &mut Self {
        self.0 = self.0.saturating_add(amount);
        self
    }

    /// Deducts `amount`, failing if the pool cannot cover it.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), GasPoolError> {
        if self.0 < amount {
            return Err(GasPoolError::GasLimitReached {
                available: self.0,
                requested: amount,
            });
        }
        self.0 -= amount;
        Ok(())
    }

    /// Gas left in the pool.
    #[must_use]
    pub const fn gas(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_and_refund() {
        let mut pool = GasPool::new(50_000);
        pool.sub_gas(30_000).unwrap();
        assert_eq!(pool.gas(), 20_000);
        pool.add_gas(5_000);
        assert_eq!(pool.gas(), 25_000);
    }

    #[test]
    fn test_exhaustion_leaves_pool_untouched() {
        let mut pool = GasPool::new(10_000);
        let err = pool.sub_gas(21_000).unwrap_err();
        assert_eq!(
            err,
            GasPoolError::GasLimitReached {
                available: 10_000,
                requested: 21_000
            }
        );
        assert_eq!(pool.gas(), 10_000);
    }
}
