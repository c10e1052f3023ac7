pub mod ingest;
pub mod message_service;
pub mod staging;
pub mod translator;
pub mod worker;
