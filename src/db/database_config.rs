// Database Configuration
// Holds one engine, a per-schema metadata cache and the alias -> relation bindings

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::connection::ConnectionTarget;
use crate::db::schema::SchemaMetadata;
use crate::db::traits::{DatabaseError, Introspector, Relation, RelationKind};
use crate::settings::ConnectOptions;

#[cfg(feature = "engine")]
use crate::db::drivers::Engine;

/// Reflected tables and views for one server/database.
///
/// The engine is created once, at construction, and kept for the lifetime of
/// the value. Schema and relation names are checked against the live
/// database on every bind. Reflected column layouts are cached per schema
/// and never refreshed, so the schema is assumed not to change underneath
/// an instance.
///
/// Relations are bound under an alias. Binding an alias that is already
/// taken replaces the old relation and returns it.
pub struct DatabaseConfig {
    server: String,
    database: String,
    default_schema: String,
    introspector: Box<dyn Introspector>,
    metadata: BTreeMap<String, SchemaMetadata>,
    bindings: BTreeMap<String, Arc<Relation>>,
}

impl DatabaseConfig {
    /// Connect with default options. Without credentials, integrated
    /// authentication is used.
    #[cfg(feature = "engine")]
    pub async fn connect(target: ConnectionTarget) -> Result<Self, DatabaseError> {
        Self::connect_with(target, &ConnectOptions::default()).await
    }

    #[cfg(feature = "engine")]
    pub async fn connect_with(
        target: ConnectionTarget,
        options: &ConnectOptions,
    ) -> Result<Self, DatabaseError> {
        let engine = Engine::connect(&target, options).await?;
        Ok(Self::with_introspector(&target, options, Box::new(engine)))
    }

    /// Build around an already-open introspection backend
    pub fn with_introspector(
        target: &ConnectionTarget,
        options: &ConnectOptions,
        introspector: Box<dyn Introspector>,
    ) -> Self {
        info!(connection = %target.label(), "database config ready");
        Self {
            server: target.server.clone(),
            database: target.database.clone(),
            default_schema: options.default_schema.clone(),
            introspector,
            metadata: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Reflect `table` and bind it under `alias` (defaults to the table name).
    ///
    /// `schema` defaults to the configured default schema (`dbo`). Returns the
    /// relation previously bound under the same alias, if any.
    pub async fn set_table(
        &mut self,
        table: &str,
        alias: Option<&str>,
        schema: Option<&str>,
    ) -> Result<Option<Arc<Relation>>, DatabaseError> {
        let relation = self.reflect(table, schema, RelationKind::Table).await?;
        Ok(self.bind(alias.unwrap_or(table), relation))
    }

    /// Reflect `view` and bind it under `alias` (defaults to the view name).
    ///
    /// Same contract as [`set_table`](Self::set_table).
    pub async fn set_view(
        &mut self,
        view: &str,
        alias: Option<&str>,
        schema: Option<&str>,
    ) -> Result<Option<Arc<Relation>>, DatabaseError> {
        let relation = self.reflect(view, schema, RelationKind::View).await?;
        Ok(self.bind(alias.unwrap_or(view), relation))
    }

    async fn reflect(
        &mut self,
        name: &str,
        schema: Option<&str>,
        kind: RelationKind,
    ) -> Result<Arc<Relation>, DatabaseError> {
        let schema = schema.unwrap_or(self.default_schema.as_str()).to_string();

        let schemas = self.introspector.schema_names().await?;
        if !schemas.iter().any(|s| *s == schema) {
            return Err(DatabaseError::MissingSchema {
                schema,
                server: self.server.clone(),
                database: self.database.clone(),
            });
        }

        if !self.metadata.contains_key(&schema) {
            debug!(%schema, "caching schema metadata");
            self.metadata
                .insert(schema.clone(), SchemaMetadata::new(schema.clone()));
        }

        let names = match kind {
            RelationKind::Table => self.introspector.table_names(&schema).await?,
            RelationKind::View => self.introspector.view_names(&schema).await?,
        };
        if !names.iter().any(|n| n == name) {
            return Err(self.missing(name, schema, kind));
        }

        if let Some(cached) = self.metadata.get(&schema).and_then(|m| m.get(name)) {
            if cached.kind == kind {
                return Ok(cached);
            }
        }

        let relation = self.introspector.reflect(&schema, name, kind).await?;
        // dropped between the name check and reflection
        if relation.columns.is_empty() {
            return Err(self.missing(name, schema, kind));
        }

        let metadata = self
            .metadata
            .entry(schema.clone())
            .or_insert_with(|| SchemaMetadata::new(schema));
        Ok(metadata.insert(relation))
    }

    fn missing(&self, name: &str, schema: String, kind: RelationKind) -> DatabaseError {
        let server = self.server.clone();
        let database = self.database.clone();
        match kind {
            RelationKind::Table => DatabaseError::MissingTable {
                table: name.to_string(),
                schema,
                server,
                database,
            },
            RelationKind::View => DatabaseError::MissingView {
                view: name.to_string(),
                schema,
                server,
                database,
            },
        }
    }

    fn bind(&mut self, alias: &str, relation: Arc<Relation>) -> Option<Arc<Relation>> {
        let previous = self.bindings.insert(alias.to_string(), relation);
        if let Some(prev) = &previous {
            warn!(alias, replaced = %prev.qualified_name(), "alias rebound");
        }
        previous
    }

    /// Relation bound under `alias`
    pub fn get(&self, alias: &str) -> Option<&Arc<Relation>> {
        self.bindings.get(alias)
    }

    /// All bindings, ordered by alias
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Arc<Relation>)> {
        self.bindings.iter().map(|(alias, rel)| (alias.as_str(), rel))
    }

    /// Remove a binding; the schema cache is left as is
    pub fn unbind(&mut self, alias: &str) -> Option<Arc<Relation>> {
        self.bindings.remove(alias)
    }

    pub fn schema_metadata(&self, schema: &str) -> Option<&SchemaMetadata> {
        self.metadata.get(schema)
    }

    /// Schemas with a metadata cache, sorted
    pub fn cached_schemas(&self) -> impl Iterator<Item = &str> {
        self.metadata.keys().map(String::as_str)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub fn introspector(&self) -> &dyn Introspector {
        self.introspector.as_ref()
    }

    /// The engine, when this config was built by [`connect`](Self::connect)
    #[cfg(feature = "engine")]
    pub fn engine(&self) -> Option<&Engine> {
        self.introspector.as_any().downcast_ref::<Engine>()
    }
}

impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Connection for: {}.{}", self.server, self.database)?;
        writeln!(f, "Current tables/views:")?;
        let entries: Vec<String> = self
            .bindings
            .iter()
            .map(|(alias, rel)| format!("{}: {}", alias, rel.name))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::traits::ColumnInfo;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        schemas: AtomicUsize,
        tables: AtomicUsize,
        views: AtomicUsize,
        reflects: AtomicUsize,
    }

    // In-memory catalog standing in for a live server
    struct MockIntrospector {
        schemas: Vec<String>,
        tables: HashMap<String, Vec<String>>,
        views: HashMap<String, Vec<String>>,
        calls: Arc<Calls>,
    }

    impl MockIntrospector {
        fn new(calls: Arc<Calls>) -> Self {
            let mut tables = HashMap::new();
            tables.insert(
                "dbo".to_string(),
                vec!["users".to_string(), "orders".to_string(), "dropped".to_string()],
            );
            tables.insert("sales".to_string(), vec!["orders".to_string()]);

            let mut views = HashMap::new();
            views.insert("dbo".to_string(), vec!["active_users".to_string()]);

            Self {
                schemas: vec!["dbo".to_string(), "sales".to_string()],
                tables,
                views,
                calls,
            }
        }
    }

    #[async_trait::async_trait]
    impl Introspector for MockIntrospector {
        async fn schema_names(&self) -> Result<Vec<String>, DatabaseError> {
            self.calls.schemas.fetch_add(1, Ordering::SeqCst);
            Ok(self.schemas.clone())
        }

        async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
            self.calls.tables.fetch_add(1, Ordering::SeqCst);
            Ok(self.tables.get(schema).cloned().unwrap_or_default())
        }

        async fn view_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
            self.calls.views.fetch_add(1, Ordering::SeqCst);
            Ok(self.views.get(schema).cloned().unwrap_or_default())
        }

        async fn reflect(
            &self,
            schema: &str,
            name: &str,
            kind: RelationKind,
        ) -> Result<Relation, DatabaseError> {
            self.calls.reflects.fetch_add(1, Ordering::SeqCst);
            // listed by name, but gone by the time its columns are read
            if name == "dropped" {
                return Ok(Relation {
                    schema: schema.to_string(),
                    name: name.to_string(),
                    kind,
                    columns: Vec::new(),
                });
            }
            Ok(Relation {
                schema: schema.to_string(),
                name: name.to_string(),
                kind,
                columns: vec![ColumnInfo {
                    name: "id".to_string(),
                    data_type: "int".to_string(),
                    max_length: Some(4),
                    precision: Some(10),
                    scale: Some(0),
                    is_nullable: false,
                    is_primary_key: true,
                    is_identity: true,
                    column_default: None,
                    ordinal_position: 1,
                }],
            })
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn config() -> (DatabaseConfig, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let target = ConnectionTarget::new("sql01", "erp");
        let config = DatabaseConfig::with_introspector(
            &target,
            &ConnectOptions::default(),
            Box::new(MockIntrospector::new(Arc::clone(&calls))),
        );
        (config, calls)
    }

    #[tokio::test]
    async fn test_set_table_defaults_alias_and_schema() {
        let (mut config, _) = config();

        let previous = config.set_table("users", None, None).await.unwrap();
        assert!(previous.is_none());

        let users = config.get("users").unwrap();
        assert_eq!(users.schema, "dbo");
        assert_eq!(users.kind, RelationKind::Table);
        assert_eq!(users.columns.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_schema_checked_before_tables() {
        let (mut config, calls) = config();

        let err = config.set_table("users", None, Some("x")).await.unwrap_err();
        match err {
            DatabaseError::MissingSchema {
                schema,
                server,
                database,
            } => {
                assert_eq!(schema, "x");
                assert_eq!(server, "sql01");
                assert_eq!(database, "erp");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 1);
        assert_eq!(calls.tables.load(Ordering::SeqCst), 0);
        assert_eq!(config.cached_schemas().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let (mut config, calls) = config();

        let err = config.set_table("invoices", None, Some("sales")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MissingTable { .. }));
        assert_eq!(
            err.to_string(),
            "Table: invoices is missing from sql01.erp.sales"
        );
        assert_eq!(calls.reflects.load(Ordering::SeqCst), 0);
        assert!(config.get("invoices").is_none());
    }

    #[tokio::test]
    async fn test_missing_view() {
        let (mut config, _) = config();

        let err = config.set_view("users", None, None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::MissingView { .. }));
        assert_eq!(err.to_string(), "View: users is missing from sql01.erp.dbo");
    }

    #[tokio::test]
    async fn test_set_view_with_alias() {
        let (mut config, _) = config();

        config
            .set_view("active_users", Some("active"), None)
            .await
            .unwrap();

        let view = config.get("active").unwrap();
        assert_eq!(view.name, "active_users");
        assert_eq!(view.kind, RelationKind::View);
        assert!(config.get("active_users").is_none());
    }

    #[tokio::test]
    async fn test_rebinding_alias_keeps_second() {
        let (mut config, _) = config();

        config.set_table("orders", None, Some("dbo")).await.unwrap();
        let previous = config.set_table("orders", None, Some("sales")).await.unwrap();

        assert_eq!(previous.unwrap().schema, "dbo");
        assert_eq!(config.get("orders").unwrap().schema, "sales");
        assert_eq!(config.bindings().count(), 1);
    }

    #[tokio::test]
    async fn test_name_lists_requeried_each_bind() {
        let (mut config, calls) = config();

        config.set_table("users", None, None).await.unwrap();
        config.set_table("users", Some("u2"), None).await.unwrap();

        assert_eq!(calls.schemas.load(Ordering::SeqCst), 2);
        assert_eq!(calls.tables.load(Ordering::SeqCst), 2);
        // second bind reuses the cached snapshot
        assert_eq!(calls.reflects.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(
            config.get("users").unwrap(),
            config.get("u2").unwrap()
        ));
    }

    #[tokio::test]
    async fn test_schema_metadata_created_once_per_schema() {
        let (mut config, _) = config();

        config.set_table("users", None, None).await.unwrap();
        config.set_table("orders", None, None).await.unwrap();
        config.set_table("orders", Some("sales_orders"), Some("sales")).await.unwrap();

        let schemas: Vec<&str> = config.cached_schemas().collect();
        assert_eq!(schemas, vec!["dbo", "sales"]);
        assert_eq!(
            config.schema_metadata("dbo").unwrap().relation_names(),
            vec!["orders", "users"]
        );
    }

    #[tokio::test]
    async fn test_schema_cached_even_when_table_missing() {
        let (mut config, _) = config();

        let _ = config.set_table("nope", None, Some("sales")).await;
        assert!(config.schema_metadata("sales").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relation_without_columns_is_missing() {
        let (mut config, calls) = config();

        let err = config.set_table("dropped", None, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Table: dropped is missing from sql01.erp.dbo"
        );
        assert!(config.get("dropped").is_none());
        assert!(config.schema_metadata("dbo").unwrap().get("dropped").is_none());

        // nothing cached, so the next attempt reflects again
        let _ = config.set_table("dropped", None, None).await;
        assert_eq!(calls.reflects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_configured_default_schema() {
        let calls = Arc::new(Calls::default());
        let options = ConnectOptions {
            default_schema: "sales".to_string(),
            ..ConnectOptions::default()
        };
        let mut config = DatabaseConfig::with_introspector(
            &ConnectionTarget::new("sql01", "erp"),
            &options,
            Box::new(MockIntrospector::new(calls)),
        );

        config.set_table("orders", None, None).await.unwrap();
        assert_eq!(config.get("orders").unwrap().schema, "sales");
    }

    #[tokio::test]
    async fn test_unbind() {
        let (mut config, _) = config();

        config.set_table("users", None, None).await.unwrap();
        assert!(config.unbind("users").is_some());
        assert!(config.get("users").is_none());
        assert!(config.schema_metadata("dbo").unwrap().get("users").is_some());
    }

    #[tokio::test]
    async fn test_display_lists_bindings() {
        let (mut config, _) = config();

        config.set_table("users", Some("people"), None).await.unwrap();
        config.set_view("active_users", None, None).await.unwrap();

        let text = config.to_string();
        assert!(text.starts_with("Connection for: sql01.erp\n"));
        assert!(text.contains("active_users: active_users"));
        assert!(text.contains("people: users"));
    }
}
