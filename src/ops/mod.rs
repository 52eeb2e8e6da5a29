pub mod check;
pub mod deps;
pub mod export;
pub mod names;
pub mod notify;
pub mod search;
pub mod status;
pub mod subtask_ops;
