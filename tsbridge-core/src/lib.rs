// tsbridge Core Library
//
// Read planning and batch-write primitives shared by the sender, the HTTP
// adapters and the CLI

pub mod error;
pub mod metadata;
pub mod planner;
pub mod point;
pub mod result;
pub mod transport;
pub mod wire;

pub use error::{MetadataError, PlanError, TransportError};
pub use metadata::{InMemoryMetadataProvider, MetadataProvider, MetadataRecord, SeriesMetadata};
pub use planner::{ChunkDescriptor, RangeChunkPlanner};
pub use point::{split_batches, Point, PointBatch};
pub use result::BatchResult;
pub use transport::BatchTransport;
pub use wire::{put_url, Destination, PutRequest, PutSummary, Tags};
