//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod account;
pub mod approval;
pub mod balance;
pub mod cash_bank;
pub mod journal;
pub mod period;
pub mod posting;
pub mod reconciliation;
pub mod reporting;
pub mod source;

pub use account::{AccountError, AccountRepository, CreateAccountInput};
pub use approval::{ApprovalListener, ApprovalRepository};
pub use balance::{BalanceSynchronizer, LockedAccounts, SyncSummary};
pub use cash_bank::{CashBankError, CashBankRepository, CreateCashBankInput};
pub use journal::{JournalEntryWithLines, JournalRepository, PostingOutcome, VoidResult};
pub use period::PeriodRepository;
pub use posting::PostingGateway;
pub use reconciliation::Reconciler;
pub use reporting::{
    AccountBalanceView, HierarchyNode, LedgerLineView, ReportError, ReportingRepository,
};
pub use source::{PgSourceRegistry, SourceRegistry};
