use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema,
    sea_query::TableCreateStatement,
};

use crate::entity;

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    create_tables(&db).await?;

    Ok(db)
}

/// Create any missing tables. Existing tables are left untouched.
pub async fn create_tables<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements: Vec<TableCreateStatement> = vec![
        schema.create_table_from_entity(entity::user::Entity),
        schema.create_table_from_entity(entity::content::Entity),
        schema.create_table_from_entity(entity::knowledge_base::Entity),
        schema.create_table_from_entity(entity::content_kb_mapping::Entity),
        schema.create_table_from_entity(entity::kb_subscription::Entity),
        schema.create_table_from_entity(entity::annotation::Entity),
        schema.create_table_from_entity(entity::chat_assistant::Entity),
        schema.create_table_from_entity(entity::session_record::Entity),
        schema.create_table_from_entity(entity::dead_letter_message::Entity),
    ];

    for statement in &mut statements {
        conn.execute(backend.build(statement.if_not_exists())).await?;
    }

    Ok(())
}
