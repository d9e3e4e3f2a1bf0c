//! Domain models for utility-service.

mod analytics;
mod bill;
mod usage;
mod validation;

pub use analytics::{
    DailyUsage, LowBalanceAlert, MonthlyComparison, MonthlyUsage, RemainingDaysEstimate,
    UsageStatistics,
};
pub use bill::{BillWithUsage, CreateBill, NewBill, UtilityBill};
pub use usage::{
    AggregateStats, NewUsage, RecordUsage, SortOrder, UsageAggregate, UsageFilter, UsageReceipt,
    UsageRecord,
};
pub use validation::{
    validate_non_negative_amount, validate_positive_quantity, AMOUNT_INTEGER_DIGITS, MAX_SCALE,
    UNIT_INTEGER_DIGITS,
};
