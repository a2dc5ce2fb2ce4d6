//! Transaction lifecycle
//!
//! One intent at a time is driven from submission to receipt, with state
//! changes and user notifications published to subscribers.

pub mod lifecycle;

pub use lifecycle::{
    Notification, NotificationKind, TransactionController, TxEvent, TxState,
};
