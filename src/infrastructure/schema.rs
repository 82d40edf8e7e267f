use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};
use tracing::info;

use entity::{accounts, drivers, merchants, registration_sessions};

/// Create every table from its entity definition if it does not exist yet.
/// Accounts come before the profile tables that reference them.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
        schema.create_table_from_entity(registration_sessions::Entity),
        schema.create_table_from_entity(accounts::Entity),
        schema.create_table_from_entity(merchants::Entity),
        schema.create_table_from_entity(drivers::Entity),
    ];
    for statement in statements.iter_mut() {
        statement.if_not_exists();
        db.execute(backend.build(&*statement)).await?;
    }

    info!(tables = statements.len(), "schema ready");
    Ok(())
}
