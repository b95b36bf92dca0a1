// Lead discovery: Google Places search, scoring and post-filtering of results.

pub mod handlers;
pub mod places;
pub mod search;
