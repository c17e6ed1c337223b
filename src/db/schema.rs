// Schema Metadata
// Catalog queries against SQL Server and the per-schema relation cache

use std::collections::HashMap;
use std::sync::Arc;

use tiberius::Row;
use tracing::debug;

use crate::db::drivers::TdsClient;
use crate::db::traits::{ColumnInfo, DatabaseError, Relation, RelationKind};

const SCHEMAS_QUERY: &str = "SELECT name FROM sys.schemas ORDER BY name";

const RELATIONS_QUERY: &str = r#"
    SELECT TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_SCHEMA = @P1 AND TABLE_TYPE = @P2
    ORDER BY TABLE_NAME
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.name AS column_name,
        t.name AS data_type,
        CAST(c.max_length AS INT) AS max_length,
        CAST(c.precision AS INT) AS precision,
        CAST(c.scale AS INT) AS scale,
        c.is_nullable,
        CAST(CASE WHEN pk.column_id IS NOT NULL THEN 1 ELSE 0 END AS BIT) AS is_primary_key,
        c.is_identity,
        dc.definition AS column_default,
        c.column_id
    FROM sys.columns c
    JOIN sys.types t ON c.user_type_id = t.user_type_id
    JOIN sys.objects o ON c.object_id = o.object_id
    JOIN sys.schemas s ON o.schema_id = s.schema_id
    LEFT JOIN sys.default_constraints dc ON c.default_object_id = dc.object_id
    LEFT JOIN (
        SELECT ic.object_id, ic.column_id
        FROM sys.indexes i
        JOIN sys.index_columns ic
            ON i.object_id = ic.object_id
            AND i.index_id = ic.index_id
        WHERE i.is_primary_key = 1
    ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
    WHERE s.name = @P1 AND o.name = @P2
    ORDER BY c.column_id
"#;

fn query_error(err: tiberius::error::Error) -> DatabaseError {
    DatabaseError::QueryError(err.to_string())
}

/// Collect name values, failing on a decode error or a NULL name
fn collect_names<'a, I>(values: I) -> Result<Vec<String>, DatabaseError>
where
    I: IntoIterator<Item = Result<Option<&'a str>, tiberius::error::Error>>,
{
    values
        .into_iter()
        .map(|value| {
            value
                .map_err(query_error)?
                .map(str::to_string)
                .ok_or_else(|| DatabaseError::QueryError("catalog returned a NULL name".to_string()))
        })
        .collect()
}

fn first_column_strings(rows: &[Row]) -> Result<Vec<String>, DatabaseError> {
    collect_names(rows.iter().map(|row| row.try_get::<&str, _>(0)))
}

fn column_from_row(row: &Row) -> Result<ColumnInfo, DatabaseError> {
    let name = row
        .try_get::<&str, _>(0)
        .map_err(query_error)?
        .ok_or_else(|| DatabaseError::QueryError("catalog returned a NULL column name".to_string()))?;

    Ok(ColumnInfo {
        name: name.to_string(),
        data_type: row.try_get::<&str, _>(1).map_err(query_error)?.unwrap_or("unknown").to_string(),
        max_length: row.try_get::<i32, _>(2).map_err(query_error)?,
        precision: row.try_get::<i32, _>(3).map_err(query_error)?,
        scale: row.try_get::<i32, _>(4).map_err(query_error)?,
        is_nullable: row.try_get::<bool, _>(5).map_err(query_error)?.unwrap_or(true),
        is_primary_key: row.try_get::<bool, _>(6).map_err(query_error)?.unwrap_or(false),
        is_identity: row.try_get::<bool, _>(7).map_err(query_error)?.unwrap_or(false),
        column_default: row.try_get::<&str, _>(8).map_err(query_error)?.map(|s| s.to_string()),
        ordinal_position: row.try_get::<i32, _>(9).map_err(query_error)?.unwrap_or(0),
    })
}

/// Fetch all schema names in the connected database
pub async fn fetch_schema_names(conn: &mut TdsClient) -> Result<Vec<String>, DatabaseError> {
    let stream = conn.simple_query(SCHEMAS_QUERY).await.map_err(query_error)?;
    let rows = stream.into_first_result().await.map_err(query_error)?;
    first_column_strings(&rows)
}

/// Fetch the names of base tables or views in `schema`
pub async fn fetch_relation_names(
    conn: &mut TdsClient,
    schema: &str,
    kind: RelationKind,
) -> Result<Vec<String>, DatabaseError> {
    let stream = conn
        .query(RELATIONS_QUERY, &[&schema, &kind.table_type()])
        .await
        .map_err(query_error)?;
    let rows = stream.into_first_result().await.map_err(query_error)?;
    first_column_strings(&rows)
}

/// Reflect the columns of `schema.name`
pub async fn fetch_relation(
    conn: &mut TdsClient,
    schema: &str,
    name: &str,
    kind: RelationKind,
) -> Result<Relation, DatabaseError> {
    let stream = conn
        .query(COLUMNS_QUERY, &[&schema, &name])
        .await
        .map_err(query_error)?;
    let rows = stream.into_first_result().await.map_err(query_error)?;

    let columns = rows
        .iter()
        .map(column_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    debug!(schema, name, %kind, columns = columns.len(), "reflected relation");

    Ok(Relation {
        schema: schema.to_string(),
        name: name.to_string(),
        kind,
        columns,
    })
}

/// Relations reflected from one schema.
///
/// Entries are never invalidated: the schema is assumed to stay unchanged
/// for as long as the owning `DatabaseConfig` lives.
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    schema: String,
    relations: HashMap<String, Arc<Relation>>,
}

impl SchemaMetadata {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            relations: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Previously reflected relation, if any
    pub fn get(&self, name: &str) -> Option<Arc<Relation>> {
        self.relations.get(name).map(Arc::clone)
    }

    /// Store a freshly reflected relation and hand back the shared snapshot
    pub fn insert(&mut self, relation: Relation) -> Arc<Relation> {
        let relation = Arc::new(relation);
        self.relations
            .insert(relation.name.clone(), Arc::clone(&relation));
        relation
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Names of reflected relations, sorted
    pub fn relation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.relations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(name: &str, kind: RelationKind) -> Relation {
        Relation {
            schema: "sales".to_string(),
            name: name.to_string(),
            kind,
            columns: Vec::new(),
        }
    }

    #[test]
    fn test_new_metadata_is_empty() {
        let metadata = SchemaMetadata::new("sales");
        assert_eq!(metadata.schema(), "sales");
        assert!(metadata.is_empty());
        assert!(metadata.get("orders").is_none());
    }

    #[test]
    fn test_insert_shares_snapshot() {
        let mut metadata = SchemaMetadata::new("sales");
        let inserted = metadata.insert(relation("orders", RelationKind::Table));
        let fetched = metadata.get("orders").unwrap();
        assert!(Arc::ptr_eq(&inserted, &fetched));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn test_relation_names_sorted() {
        let mut metadata = SchemaMetadata::new("sales");
        metadata.insert(relation("orders", RelationKind::Table));
        metadata.insert(relation("customer_totals", RelationKind::View));
        assert_eq!(metadata.relation_names(), vec!["customer_totals", "orders"]);
    }

    #[test]
    fn test_collect_names() {
        let names = collect_names(vec![Ok(Some("dbo")), Ok(Some("sales"))]).unwrap();
        assert_eq!(names, vec!["dbo", "sales"]);
    }

    #[test]
    fn test_collect_names_surfaces_decode_error() {
        let err = collect_names(vec![
            Ok(Some("dbo")),
            Err(tiberius::error::Error::Conversion("expected a string".into())),
        ])
        .unwrap_err();
        assert!(matches!(err, DatabaseError::QueryError(_)));
    }

    #[test]
    fn test_collect_names_rejects_null() {
        let err = collect_names(vec![Ok(None)]).unwrap_err();
        assert!(matches!(err, DatabaseError::QueryError(_)));
    }
}
