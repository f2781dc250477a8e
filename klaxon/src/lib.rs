pub mod controller;
pub mod ingest;
pub mod publishers;
