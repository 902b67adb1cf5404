pub mod share_lifecycle;
pub mod share_service;
pub mod storage;
pub mod sweeper;
