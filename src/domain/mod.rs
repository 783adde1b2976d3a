pub mod event;
pub mod transaction;

pub use event::{StarknetEventLog, StarknetTransactionEvent};
pub use transaction::{
    EscrowDetails, FraudSignals, PaymentMethod, Transaction, TransactionStatus,
};
