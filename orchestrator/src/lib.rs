//! Judging orchestrator: submits solutions to a batch judging service,
//! polls every test case, and reduces the results into one verdict stored on
//! the submission.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod judge;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod prelude;
pub mod store;
pub mod submitter;
pub mod util;
pub mod verdict;

#[cfg(test)]
mod test;
