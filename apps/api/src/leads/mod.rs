// Lead records: qualification scoring, phone handling, persistence and the lead API.

pub mod handlers;
pub mod phone;
pub mod scoring;
pub mod store;
