//! Bootstraps the four tables of spec.md §3 on a fresh connection.
//!
//! The teacher crate never owned a migrations binary, and neither does this
//! one: `sea_orm::Schema` builds the `CREATE TABLE` statements straight from
//! the entity definitions, which is enough for both the embedded test
//! database and a from-scratch production database. A deployment that wants
//! versioned migrations layers `sea-orm-migration` on top of these same
//! entities; this module only covers "create if absent."

use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Schema};

use crate::errors::RegistryError;

use super::entities::{generation_job, repository, sdk_preference, trigger_job};

pub async fn create_all(db: &DatabaseConnection) -> Result<(), RegistryError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, backend, repository::Entity).await?;
    create_table(db, &schema, backend, sdk_preference::Entity).await?;
    create_table(db, &schema, backend, trigger_job::Entity).await?;
    create_table(db, &schema, backend, generation_job::Entity).await?;

    // Enforce "at most one row per (RepositoryId, Sdk)" (spec.md §3).
    let unique_pref = format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sdk_preferences_repo_sdk ON {} (repository_id, sdk)",
        sdk_preference::Entity.table_name()
    );
    db.execute(sea_orm::Statement::from_string(backend, unique_pref))
        .await?;

    Ok(())
}

async fn create_table<E>(
    db: &DatabaseConnection,
    schema: &Schema,
    backend: DbBackend,
    entity: E,
) -> Result<(), RegistryError>
where
    E: sea_orm::EntityTrait,
{
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    let builder = backend.build(&stmt);
    db.execute(builder).await?;
    Ok(())
}

use sea_orm::EntityName;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    #[tokio::test]
    async fn creates_tables_on_fresh_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_all(&db).await.unwrap();
        // Re-running must be idempotent (IF NOT EXISTS).
        create_all(&db).await.unwrap();
    }
}
