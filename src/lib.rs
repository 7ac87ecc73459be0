pub mod aggregate;
pub mod endpoints;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod ride;
pub mod routing;
pub mod stations;
