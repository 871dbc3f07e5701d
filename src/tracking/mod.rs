//! Client-side tracking of asynchronous verification jobs.
//!
//! [`poller::StatusPoller`] and [`stream::StreamSubscriber`] move snapshots
//! and step updates off the network; [`staleness`] and [`connectivity`]
//! watch them from the side; [`view`] maps the final state onto a result
//! view. [`tracker::JobTracker`] wires all of them together for one job.

pub mod connectivity;
pub mod notice;
pub mod poller;
pub mod staleness;
pub mod stream;
pub mod submit;
pub mod tracker;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use notice::{Notice, Severity};
pub use poller::{PollOptions, PollPhase, PollState, PollerHandle, StatusPoller};
pub use staleness::StalenessMonitor;
pub use stream::{ConnectionState, StreamHandler, StreamOptions, StreamSubscriber};
pub use submit::{submit, submit_and_track};
pub use tracker::{JobTracker, TrackerEvent, TrackerOptions};
pub use view::{JobView, ResultSummary, ViewAction};
