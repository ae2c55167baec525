pub mod carrier;
pub mod checksum;
pub mod config;
pub mod control;
pub mod downloader;
pub mod logging;
pub mod manifest;
pub mod naming;
pub mod pipeline;
pub mod probe;
pub mod remux;
pub mod retry;
pub mod storage;
