pub mod browser;
pub mod cli;
pub mod config;
pub mod dates;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod locate;
pub mod model;
pub mod paginate;
pub mod report;
pub mod session;
pub mod sink;
pub mod util;
pub mod workflow;
