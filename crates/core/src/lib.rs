pub mod billing;
pub mod config;
pub mod cursor;
pub mod domain;
pub mod errors;
pub mod routing;

pub use billing::{billable_minutes, cycle_window, usage_summary, UsageSummary};
pub use cursor::Cursor;
pub use domain::call::{CallId, CallRecord};
pub use domain::event::{TaskEvent, TaskEventKind, TenantId};
pub use domain::subscription::Subscription;
pub use domain::task::{Task, TaskId, TaskStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use routing::{resolve, RoutingAction, RoutingRule, TimeRange};
