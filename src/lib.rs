//! Class balancing for YOLO-format object detection datasets.
//!
//! The balancer copies an input dataset into an output folder, then tops up
//! under-represented classes from a secondary pool and evicts excess
//! instances into an overflow folder until every class holds the target
//! object count.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;

pub use crate::config::BalancerConfig;
pub use crate::core::analysis::{
    BalanceOutcome, BalanceProgressMessage, BalanceReport, BalanceWarning, DatasetBalancer,
    SelectionStrategy,
};
pub use crate::core::operations::EvictionPolicy;
pub use crate::error::{BalanceError, FileOpError, StateError};
