use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;

use tokenboard_core::boards::BoardId;
use tokenboard_core::settings::{BoardSelectionStore, LAST_SELECTED_BOARD_KEY};
use tokenboard_core::Result;

use super::model::AppSettingDB;
use crate::db::get_connection;
use crate::errors::StorageError;
use crate::schema::app_settings;

/// Key/value settings persisted in the `app_settings` table.
pub struct SqliteSettingsRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
}

impl SqliteSettingsRepository {
    pub fn new(pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>) -> Self {
        Self { pool }
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        let value = app_settings::table
            .find(key)
            .select(app_settings::setting_value)
            .first::<String>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    pub fn update_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        let row = AppSettingDB {
            setting_key: key.to_string(),
            setting_value: value.to_string(),
        };
        diesel::insert_into(app_settings::table)
            .values(&row)
            .on_conflict(app_settings::setting_key)
            .do_update()
            .set(app_settings::setting_value.eq(value))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        debug!("[Storage] Updated setting {}", key);
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let mut conn = get_connection(&self.pool)?;
        let deleted = diesel::delete(app_settings::table.find(key))
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        Ok(deleted > 0)
    }
}

impl BoardSelectionStore for SqliteSettingsRepository {
    fn last_selected_board(&self) -> Result<Option<BoardId>> {
        Ok(self
            .get_setting(LAST_SELECTED_BOARD_KEY)?
            .filter(|value| !value.is_empty())
            .map(BoardId::from))
    }

    fn set_last_selected_board(&self, board_id: &BoardId) -> Result<()> {
        self.update_setting(LAST_SELECTED_BOARD_KEY, board_id.as_str())
    }
}
