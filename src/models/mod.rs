// Domain models

mod event;
mod probe;
mod stats;
mod target;

pub use event::{DaemonEvent, LogLine, LogStream};
pub use probe::{AlertEvent, Classification, ProbeResult};
pub use stats::{CounterSnapshot, StatSample};
pub use target::{ContainerState, PortMapping, Protocol, Target};
