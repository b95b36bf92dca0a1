// Campaigns: configuration, manual enrolment queue, daily task dispatch and
// send tracking.

pub mod dispatch;
pub mod handlers;
pub mod store;
pub mod tracker;
