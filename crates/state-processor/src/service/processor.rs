//! # Block Processor API Implementation
//!
//! Implements the BlockProcessorApi trait: the per-block driver and the
//! per-transaction apply step.

use super::*;
use crate::domain::entities::{
    Block, Header, ProcessOutput, Receipt, Transaction, TxContext, VmConfig,
};
use crate::domain::gas_pool::GasPool;
use crate::domain::receipt_builder::ReceiptBuilder;
use crate::domain::records::{ReceiptRecord, TransactionRecord, TxRecords};
use crate::errors::{ProcessError, Result};
use crate::persistence::FlushReport;
use crate::ports::inbound::BlockProcessorApi;
use crate::ports::outbound::StateHandle;
use recorder_telemetry::{
    log_block_event, log_tx_event, metric_inc, time_histogram, BLOCKS_PROCESSED, BLOCK_FAILURES,
    BLOCK_PROCESSING_DURATION, TRANSACTIONS_APPLIED,
};
use tracing::{info, instrument, warn};

impl<E, M, C, H> BlockProcessorApi for StateProcessor<E, M, C, H>
where
    E: ExecutionEngine,
    M: MessageSigner,
    C: ConsensusEngine,
    H: HardForkMutator,
{
    #[instrument(
        skip_all,
        fields(block_number = block.number(), txs = block.transactions.len())
    )]
    fn process<S: StateHandle>(
        &mut self,
        block: &Block,
        state: &mut S,
        vm_config: &VmConfig,
    ) -> Result<ProcessOutput> {
        let _timer = time_histogram!(BLOCK_PROCESSING_DURATION);
        let header = &block.header;

        if self.chain.is_dao_fork_block(header.number) {
            info!("Applying DAO hard fork state change");
            self.hard_fork.apply_dao_hard_fork(state);
        }

        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut used_gas = 0u64;
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut logs = Vec::new();

        self.sink.begin_block();
        for (i, tx) in block.transactions.iter().enumerate() {
            state.prepare(tx.hash, header.hash, i);
            let applied = self.apply_transaction(
                &mut gas_pool,
                state,
                header,
                tx,
                i,
                &mut used_gas,
                vm_config,
            );
            let (receipt, _) = match applied {
                Ok(applied) => applied,
                Err(e) => {
                    warn!(tx_index = i, error = %e, "Block aborted");
                    return Err(self.abort_block(e));
                }
            };
            logs.extend(receipt.logs.iter().cloned());
            receipts.push(receipt);
        }

        let finalized =
            self.consensus
                .finalize(header, state, &block.transactions, &block.uncles, &receipts);
        if let Err(e) = finalized {
            warn!(error = %e, "Block finalization failed");
            return Err(self.abort_block(ProcessError::from(e)));
        }

        metric_inc!(BLOCKS_PROCESSED);
        log_block_event!(
            debug,
            "processor",
            "Block processed",
            header.number,
            header.hash,
            gas_used = used_gas
        );

        Ok(ProcessOutput {
            receipts,
            logs,
            gas_used: used_gas,
        })
    }

    fn apply_transaction<S: StateHandle>(
        &mut self,
        gas_pool: &mut GasPool,
        state: &mut S,
        header: &Header,
        tx: &Transaction,
        tx_index: usize,
        used_gas: &mut u64,
        vm_config: &VmConfig,
    ) -> Result<(Receipt, u64)> {
        self.trace.reset();

        let msg = self
            .signer
            .as_message(tx, header.number)
            .map_err(|source| ProcessError::MessageConstruction {
                tx_hash: tx.hash,
                source,
            })?;

        let tx_record = TransactionRecord::new(tx, &msg, header, tx_index);

        let ctx = TxContext::new(&msg, header, tx.hash, tx_index);
        self.trace.reset();
        let outcome = self
            .engine
            .execute(&msg, &ctx, state, gas_pool, &mut self.trace, vm_config)
            .map_err(|source| ProcessError::Execution {
                tx_hash: tx.hash,
                source,
            })?;

        let trace_record = self.trace.snapshot(tx.hash);

        let post_state = if self.chain.is_byzantium(header.number) {
            state.finalise(true);
            None
        } else {
            Some(state.intermediate_root(self.chain.is_eip158(header.number)))
        };

        let gas = outcome.gas_used;
        *used_gas += gas;

        let receipt = ReceiptBuilder::new(header, tx, &msg, tx_index)
            .post_state(post_state)
            .build(&outcome, *used_gas);
        let receipt_record =
            ReceiptRecord::new(&receipt, outcome.vm_error.clone().unwrap_or_default());

        self.sink
            .record(TxRecords {
                transaction: tx_record,
                trace: trace_record,
                receipt: receipt_record,
            })
            .map_err(|source| ProcessError::Persistence {
                tx_hash: tx.hash,
                source,
            })?;

        let status = if receipt.succeeded() { "success" } else { "failed" };
        metric_inc!(TRANSACTIONS_APPLIED, &[status]);
        log_tx_event!(
            debug,
            "processor",
            "Transaction applied",
            tx.hash,
            tx_index,
            gas,
            cumulative_gas = *used_gas,
            status
        );

        Ok((receipt, gas))
    }

    fn flush(&mut self) -> FlushReport {
        self.sink.flush()
    }
}

impl<E, M, C, H> StateProcessor<E, M, C, H>
where
    E: ExecutionEngine,
    M: MessageSigner,
    C: ConsensusEngine,
    H: HardForkMutator,
{
    /// Drops the failed block's buffered records and hands the error back.
    fn abort_block(&mut self, err: ProcessError) -> ProcessError {
        metric_inc!(BLOCK_FAILURES, &[failure_stage(&err)]);
        let dropped = self.sink.discard_block();
        if dropped > 0 {
            info!(dropped, "Dropped records of aborted block");
        }
        err
    }
}

/// Metric label for the stage an error came from.
fn failure_stage(err: &ProcessError) -> &'static str {
    match err {
        ProcessError::MessageConstruction { .. } => "message",
        ProcessError::Execution { .. } => "execution",
        ProcessError::Persistence { .. } => "persistence",
        ProcessError::Finalize(_) => "finalize",
    }
}
