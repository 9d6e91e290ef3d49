use std::sync::Arc;

use super::clock::Clock;
use super::curriculum::{CurriculumCatalog, CurriculumResolver};
use super::fees::{FeeCalculator, FeeSchedule};
use super::ledger::LedgerService;
use super::memory::{
    InMemoryConnectionRegistry, InMemoryLedger, InMemoryNotificationStore,
    InMemoryReceiptStorage, InMemoryRequestRepository, InMemoryUserDirectory,
};
use super::migration::{DashPrefixPolicy, MigrationConfig, MigrationEngine, StudentIdVariantPolicy};
use super::notifications::{
    ConnectionRegistry, DirectoryIdentityResolver, IdentityResolver, NotificationDispatcher,
    NotificationStore, StudentNotifier, UserDirectory,
};
use super::receipts::{ReceiptIntake, ReceiptPolicy, ReceiptStorage};
use super::repository::{LedgerRepository, RequestRepository};
use super::requests::EnrollmentRequestService;

/// Tunables applied when the workflow is assembled.
#[derive(Clone)]
pub struct WorkflowSettings {
    pub migration: MigrationConfig,
    pub fee_schedule: FeeSchedule,
    pub receipt_policy: ReceiptPolicy,
    pub variant_policy: Arc<dyn StudentIdVariantPolicy>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            migration: MigrationConfig::default(),
            fee_schedule: FeeSchedule::default(),
            receipt_policy: ReceiptPolicy::default(),
            variant_policy: Arc::new(DashPrefixPolicy),
        }
    }
}

/// Storage and delivery adapters the workflow runs against.
pub struct EnrollmentBackends {
    pub requests: Arc<dyn RequestRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub catalog: Arc<dyn CurriculumCatalog>,
    pub directory: Arc<dyn UserDirectory>,
    pub notifications: Arc<dyn NotificationStore>,
    pub connections: Arc<dyn ConnectionRegistry>,
    pub receipts: Arc<dyn ReceiptStorage>,
    pub clock: Arc<dyn Clock>,
}

/// Concrete handles to the in-memory adapters, for inspection by tests and demos.
#[derive(Clone)]
pub struct InMemoryHandles {
    pub requests: Arc<InMemoryRequestRepository>,
    pub ledger: Arc<InMemoryLedger>,
    pub directory: Arc<InMemoryUserDirectory>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub connections: Arc<InMemoryConnectionRegistry>,
    pub receipts: Arc<InMemoryReceiptStorage>,
}

impl InMemoryHandles {
    pub fn new() -> Self {
        Self::with_ledger(InMemoryLedger::default())
    }

    pub fn with_ledger(ledger: InMemoryLedger) -> Self {
        Self {
            requests: Arc::new(InMemoryRequestRepository::default()),
            ledger: Arc::new(ledger),
            directory: Arc::new(InMemoryUserDirectory::default()),
            notifications: Arc::new(InMemoryNotificationStore::default()),
            connections: Arc::new(InMemoryConnectionRegistry::default()),
            receipts: Arc::new(InMemoryReceiptStorage::default()),
        }
    }

    pub fn backends(
        &self,
        catalog: Arc<dyn CurriculumCatalog>,
        clock: Arc<dyn Clock>,
    ) -> EnrollmentBackends {
        EnrollmentBackends {
            requests: self.requests.clone(),
            ledger: self.ledger.clone(),
            catalog,
            directory: self.directory.clone(),
            notifications: self.notifications.clone(),
            connections: self.connections.clone(),
            receipts: self.receipts.clone(),
            clock,
        }
    }
}

impl Default for InMemoryHandles {
    fn default() -> Self {
        Self::new()
    }
}

/// Every enrollment service wired against one set of backends.
pub struct EnrollmentWorkflow {
    pub requests: Arc<EnrollmentRequestService>,
    pub migration: Arc<MigrationEngine>,
    pub ledger: Arc<LedgerService>,
    pub curriculum: Arc<CurriculumResolver>,
    pub fees: Arc<FeeCalculator>,
    pub receipts: Arc<ReceiptIntake>,
}

impl EnrollmentWorkflow {
    pub fn assemble(backends: EnrollmentBackends, settings: WorkflowSettings) -> Self {
        let curriculum = Arc::new(CurriculumResolver::new(backends.catalog));
        let fees = Arc::new(FeeCalculator::new(settings.fee_schedule, curriculum.clone()));

        let identities: Arc<dyn IdentityResolver> =
            Arc::new(DirectoryIdentityResolver::new(backends.directory));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            backends.notifications,
            backends.connections,
            backends.clock.clone(),
        ));
        let notifier = Arc::new(StudentNotifier::new(identities, dispatcher));

        let requests = Arc::new(EnrollmentRequestService::new(
            backends.requests.clone(),
            curriculum.clone(),
            fees.clone(),
            notifier.clone(),
            backends.clock.clone(),
        ));
        let migration = Arc::new(MigrationEngine::new(
            backends.requests,
            backends.ledger.clone(),
            notifier,
            settings.variant_policy,
            backends.clock.clone(),
            settings.migration,
        ));
        let ledger = Arc::new(LedgerService::new(backends.ledger));
        let receipts = Arc::new(ReceiptIntake::new(
            settings.receipt_policy,
            backends.receipts,
            backends.clock,
        ));

        Self {
            requests,
            migration,
            ledger,
            curriculum,
            fees,
            receipts,
        }
    }

    /// Assemble against fresh in-memory adapters.
    pub fn in_memory(
        catalog: Arc<dyn CurriculumCatalog>,
        clock: Arc<dyn Clock>,
        settings: WorkflowSettings,
    ) -> (Self, InMemoryHandles) {
        let handles = InMemoryHandles::new();
        let workflow = Self::assemble(handles.backends(catalog, clock), settings);
        (workflow, handles)
    }
}
