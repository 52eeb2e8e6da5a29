//! A local library of markdown plans with YAML frontmatter: listing,
//! search, dependencies, archive, notifications and saved views, exposed
//! through the `pb` CLI, an RPC channel surface and an HTTP server.

pub mod cli;
pub mod io;
pub mod model;
pub mod ops;
pub mod parse;
pub mod rpc;
pub mod server;
pub mod util;
