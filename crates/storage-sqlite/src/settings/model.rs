//! Database model for key/value application settings.

use diesel::prelude::*;

#[derive(Queryable, Insertable, AsChangeset, Selectable, Debug, Clone, PartialEq, Eq)]
#[diesel(primary_key(setting_key))]
#[diesel(table_name = crate::schema::app_settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AppSettingDB {
    pub setting_key: String,
    pub setting_value: String,
}
