mod balance_analyzer;
mod rebalancer;
mod report;

pub use balance_analyzer::{
    analyze_pairing, class_delta, count_of, excesses, format_class_counts, is_balanced,
    log_class_counts, shortfalls, ClassDelta, IntegrityIssue, IntegrityIssueType, IntegrityStats,
};
pub use rebalancer::{order_candidates, BalanceProgressMessage, DatasetBalancer, SelectionStrategy};
pub use report::{BalanceOutcome, BalanceReport, BalanceWarning};
