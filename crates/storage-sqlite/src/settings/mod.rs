mod model;
mod repository;

pub use model::AppSettingDB;
pub use repository::SqliteSettingsRepository;
