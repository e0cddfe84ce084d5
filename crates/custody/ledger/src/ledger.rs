use std::sync::Arc;

use custody_types::{CustodyTransferEntry, EvidenceRecord, NewEvidence, TrustConfig};
use tracing::{info, warn};

use crate::contract::{CustodyTransfer, EvidenceContract, LedgerInit};
use crate::error::LedgerResult;
use crate::events::LedgerEvent;
use crate::state::{InMemoryStateStore, StateStore};
use crate::tx::{Transaction, TxContext, TxReceipt};
use crate::verifier::{PermitEnvelope, PermitVerifier, VerifierConfig};

/// Facade running each invocation as begin, execute, commit.
///
/// Invocations that fail during execution are dropped without touching the
/// world state. Invocations that fail at commit (stale reads) have no effect
/// either.
pub struct EvidenceLedger {
    store: Arc<dyn StateStore>,
    contract: EvidenceContract,
}

impl EvidenceLedger {
    pub fn new(store: Arc<dyn StateStore>, config: VerifierConfig) -> Self {
        Self {
            store,
            contract: EvidenceContract::new(PermitVerifier::new(config)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStateStore::new()), VerifierConfig::default())
    }

    pub fn contract(&self) -> &EvidenceContract {
        &self.contract
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn begin(&self, ctx: TxContext) -> Transaction<'_> {
        Transaction::new(self.store.as_ref(), ctx)
    }

    pub fn commit(&self, tx: Transaction<'_>) -> LedgerResult<TxReceipt> {
        let commit = tx.into_commit();
        let tx_id = commit.tx_id.clone();
        let writes = commit.write_set.len();
        let events = commit.events.len();

        match self.store.commit(commit) {
            Ok(block) => {
                info!(tx_id = %tx_id, block, writes, events, "Transaction committed");
                Ok(TxReceipt {
                    tx_id,
                    block,
                    writes,
                    events,
                })
            }
            Err(err) => {
                warn!(tx_id = %tx_id, error = %err, "Transaction rejected at commit");
                Err(err.into())
            }
        }
    }

    /// Execute `op` and commit its effects.
    pub fn submit<T>(
        &self,
        ctx: TxContext,
        op: impl FnOnce(&EvidenceContract, &mut Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<(T, TxReceipt)> {
        let tx_id = ctx.tx_id.clone();
        let mut tx = self.begin(ctx);
        let output = op(&self.contract, &mut tx).inspect_err(|err| {
            warn!(
                tx_id = %tx_id,
                reason = %err.code().map(|c| c.as_str()).unwrap_or("INTERNAL"),
                error = %err,
                "Transaction aborted"
            );
        })?;
        let receipt = self.commit(tx)?;
        Ok((output, receipt))
    }

    /// Execute a read-only `op` against current state; nothing is committed.
    pub fn evaluate<T>(
        &self,
        op: impl FnOnce(&EvidenceContract, &mut Transaction<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut tx = self.begin(TxContext::new("query", 0));
        op(&self.contract, &mut tx)
    }

    pub fn init_ledger(&self, ctx: TxContext, init: LedgerInit) -> LedgerResult<TxReceipt> {
        self.submit(ctx, |contract, tx| contract.init_ledger(tx, init))
            .map(|(_, receipt)| receipt)
    }

    pub fn create_evidence(
        &self,
        ctx: TxContext,
        evidence: NewEvidence,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<EvidenceRecord> {
        self.submit(ctx, |contract, tx| contract.create_evidence(tx, evidence, envelope))
            .map(|(record, _)| record)
    }

    pub fn transfer_custody(
        &self,
        ctx: TxContext,
        transfer: CustodyTransfer,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<CustodyTransferEntry> {
        self.submit(ctx, |contract, tx| contract.transfer_custody(tx, transfer, envelope))
            .map(|(entry, _)| entry)
    }

    pub fn read_evidence(
        &self,
        ctx: TxContext,
        evidence_id: &str,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<EvidenceRecord> {
        self.submit(ctx, |contract, tx| contract.read_evidence(tx, evidence_id, envelope))
            .map(|(record, _)| record)
    }

    pub fn query_evidence_by_case(
        &self,
        ctx: TxContext,
        case_id: &str,
        envelope: &PermitEnvelope,
    ) -> LedgerResult<Vec<EvidenceRecord>> {
        self.submit(ctx, |contract, tx| {
            contract.query_evidence_by_case(tx, case_id, envelope)
        })
        .map(|(records, _)| records)
    }

    pub fn get_custody_history(&self, evidence_id: &str) -> LedgerResult<Vec<CustodyTransferEntry>> {
        self.evaluate(|contract, tx| contract.get_custody_history(tx, evidence_id))
    }

    pub fn get_trust_config(&self) -> LedgerResult<TrustConfig> {
        self.evaluate(|contract, tx| contract.get_trust_config(tx))
    }

    pub fn update_trust_config(&self, ctx: TxContext, trust: TrustConfig) -> LedgerResult<TrustConfig> {
        self.submit(ctx, |contract, tx| contract.update_trust_config(tx, trust))
            .map(|(trust, _)| trust)
    }

    pub fn events(&self) -> LedgerResult<Vec<LedgerEvent>> {
        Ok(self.store.events()?)
    }

    pub fn height(&self) -> LedgerResult<u64> {
        Ok(self.store.height()?)
    }
}

impl Default for EvidenceLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}
