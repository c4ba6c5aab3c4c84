pub mod api;
pub mod codec;
pub mod config;
pub mod event;
pub mod inventory;
pub mod listener;
pub mod report;
pub mod retry;
pub mod snapshot;
pub mod source;
pub mod sync;

pub use api::{HttpClient, MockApi, SharedApi, TestomatApi, TransportError};
pub use codec::TestId;
pub use config::{Config, ConfigError, ImportOptions};
pub use event::HostEvent;
pub use inventory::{Inventory, InventoryBuilder};
pub use listener::{ImportListener, ReportListener, RunReport, TestDirective};
pub use report::{DeliveryPipeline, ReportError, ResultRecord, RunSession, Status};
pub use retry::RetryPolicy;
pub use snapshot::ProjectSnapshot;
pub use source::{RobotFileRewriter, SourceRewriter};
pub use sync::{ReconciliationPlan, SyncError, SyncOutcome, SyncTransport};
