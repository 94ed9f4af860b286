pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod memory;
pub mod messenger;

pub use database::DbClient;
pub use booking_repo::PgRecordStore;
pub use memory::MemoryRecordStore;
pub use messenger::TelegramMessenger;
