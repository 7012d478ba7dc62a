use mongodb::{Client, Database};

use crate::errors::Result;

pub async fn get_db_client(database_url: &str, db_name: &str) -> Result<Database> {
    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(db_name);

    // Fail fast when the server is unreachable.
    let collections = db.list_collection_names().await?;
    tracing::info!("Connected to database: {}", db_name);
    tracing::debug!("Collections found: {:?}", collections);

    Ok(db)
}
