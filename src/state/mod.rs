mod store;

pub use store::{BalancePhase, BalancerState, StateStore, STATE_FILE};
