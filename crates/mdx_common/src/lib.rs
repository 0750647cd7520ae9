//! mdx_common - Dictionary discovery and lookup resolution for mdxd
//!
//! Everything in here is free of network state: the scanner turns a
//! directory tree into descriptors, the resolver turns a request key into a
//! `Resolution`, and the port allocator hands out listener ports.

pub mod descriptor;
pub mod engine;
pub mod mime;
pub mod ports;
pub mod resolver;
pub mod scanner;

pub use descriptor::*;
pub use engine::{
    Archive, ArchiveError, ArchiveOpener, LookupRecord, MemoryArchive, SourceArchive,
    SourceArchiveOpener,
};
pub use ports::{PortAllocator, PortError, PortPolicy};
pub use resolver::{LookupResolver, Resolution, ResolveError};
pub use scanner::{scan, ResourceOrder, ScanError, ScanRules};
