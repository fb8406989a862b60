mod broker;
mod metrics;
mod queue;
mod router;
mod store;

pub use broker::{Broker, Delivery, Envelope};
pub use metrics::QueueMetrics;
pub use router::{Route, RouteTable};
pub use store::{ListFilter, TaskPage, TrackingStore};
