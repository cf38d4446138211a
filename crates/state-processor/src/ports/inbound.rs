//! # Inbound Ports (Driving Ports)
//!
//! The API the node's block import pipeline calls into.

use crate::domain::entities::{Block, Header, ProcessOutput, Receipt, Transaction, VmConfig};
use crate::domain::gas_pool::GasPool;
use crate::errors::Result;
use crate::persistence::FlushReport;
use crate::ports::outbound::StateHandle;

/// Primary API of the state processor.
pub trait BlockProcessorApi {
    /// Executes every transaction of `block` against `state`.
    ///
    /// ## Abort-on-error
    ///
    /// The first failing transaction aborts the block; no partial receipts
    /// are returned. Consensus finalization runs only if every transaction
    /// succeeded.
    ///
    /// ## Errors
    ///
    /// - `MessageConstruction`: sender recovery failed
    /// - `Execution`: the engine reported a fatal error (e.g. gas pool exhausted)
    /// - `Persistence`: synchronous recording failed
    /// - `Finalize`: consensus finalization failed
    fn process<S: StateHandle>(
        &mut self,
        block: &Block,
        state: &mut S,
        vm_config: &VmConfig,
    ) -> Result<ProcessOutput>;

    /// Executes one transaction and records it.
    ///
    /// `used_gas` is the block's running total and is advanced by the gas the
    /// transaction consumed. Returns the receipt and that gas amount.
    #[allow(clippy::too_many_arguments)]
    fn apply_transaction<S: StateHandle>(
        &mut self,
        gas_pool: &mut GasPool,
        state: &mut S,
        header: &Header,
        tx: &Transaction,
        tx_index: usize,
        used_gas: &mut u64,
        vm_config: &VmConfig,
    ) -> Result<(Receipt, u64)>;

    /// Drains any partially filled batch to the store.
    fn flush(&mut self) -> FlushReport;
}
