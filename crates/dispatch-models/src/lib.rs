pub mod allocation;
pub mod config;
pub mod records;
pub mod schema;
pub mod summary;

pub use allocation::{AgentAllocation, AllocationReport};
pub use config::{
    AllocationConfig, BudgetWindow, DispatchConfig, ReportingConfig, ScheduleConfig, StoreConfig,
};
pub use records::{
    Agent, AgentId, Assignment, AssignmentId, BulkOrderRequest, Location, NewOrder, Order,
    OrderId, Warehouse, WarehouseId,
};
pub use summary::{
    AgentDetail, AgentSummary, Page, PaginatedAgentSummary, PaginatedAssignments, SystemSummary,
    DEFAULT_PAGE_LIMIT,
};
