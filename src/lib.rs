pub mod batch;
pub mod event;
pub mod identity;
pub mod kpi;
pub mod merge;
pub mod publish;
pub mod runlog;
pub mod schema;
pub mod source;
pub mod store;
