use std::sync::Mutex;
use std::time::Duration;

use axum::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use gridquery::data::{
    single_query_list, single_query_read, BindValue, CompiledQueryCache, ExecuteError, Executor,
    ListParams, NestedParams, QueryContext, QueryDefaults, ReadParams, Row,
};
use gridquery::meta::{
    Column, ColumnKind, DataType, LinkOptions, LinksOptions, LookupOptions, Model, RelationKind,
    StaticMetaStore, View,
};

fn column(id: &str, title: &str, name: &str, kind: ColumnKind) -> Column {
    Column {
        id: id.to_owned(),
        title: title.to_owned(),
        column_name: name.to_owned(),
        system: false,
        primary_key: false,
        auto_increment: false,
        display_value: false,
        kind,
    }
}

fn scalar(id: &str, title: &str, name: &str, data_type: DataType) -> Column {
    column(id, title, name, ColumnKind::Scalar { data_type })
}

fn primary_key(id: &str, title: &str, name: &str) -> Column {
    Column {
        primary_key: true,
        auto_increment: true,
        ..scalar(id, title, name, DataType::Integer)
    }
}

fn display(mut column: Column) -> Column {
    column.display_value = true;
    column
}

fn fixture_models(mm_model_id: &str) -> Vec<Model> {
    let customers = Model {
        id: "customers".to_owned(),
        title: "Customers".to_owned(),
        table_name: "customers".to_owned(),
        version: 1,
        columns: vec![
            primary_key("cust_id", "Id", "id"),
            display(scalar("cust_name", "Name", "name", DataType::Text)),
        ],
    };

    let tags = Model {
        id: "tags".to_owned(),
        title: "Tags".to_owned(),
        table_name: "tags".to_owned(),
        version: 1,
        columns: vec![
            primary_key("tag_id", "Id", "id"),
            display(scalar("tag_name", "Name", "name", DataType::Text)),
            scalar("tag_active", "Active", "active", DataType::Boolean),
        ],
    };

    let orders_tags = Model {
        id: "orders_tags".to_owned(),
        title: "OrdersTags".to_owned(),
        table_name: "orders_tags".to_owned(),
        version: 1,
        columns: vec![
            scalar("ot_order", "OrderId", "order_id", DataType::Integer),
            scalar("ot_tag", "TagId", "tag_id", DataType::Integer),
        ],
    };

    let orders = Model {
        id: "orders".to_owned(),
        title: "Orders".to_owned(),
        table_name: "orders".to_owned(),
        version: 1,
        columns: vec![
            primary_key("ord_id", "Id", "id"),
            display(scalar("ord_title", "Title", "title", DataType::Text)),
            scalar("ord_active", "Active", "active", DataType::Boolean),
            scalar("ord_placed", "PlacedAt", "placed_at", DataType::Timestamp),
            Column {
                system: true,
                ..column("ord_created", "CreatedAt", "created_at", ColumnKind::CreatedTime)
            },
            scalar("ord_customer_fk", "CustomerId", "customer_id", DataType::Integer),
            column(
                "ord_customer",
                "Customer",
                "",
                ColumnKind::Link(LinkOptions {
                    relation: RelationKind::BelongsTo,
                    related_model_id: "customers".to_owned(),
                    child_column_id: "ord_customer_fk".to_owned(),
                    parent_column_id: "cust_id".to_owned(),
                    mm_model_id: None,
                    mm_child_column_id: None,
                    mm_parent_column_id: None,
                    belongs_to: false,
                }),
            ),
            column(
                "ord_tags",
                "Tags",
                "",
                ColumnKind::Link(LinkOptions {
                    relation: RelationKind::ManyToMany,
                    related_model_id: "tags".to_owned(),
                    child_column_id: "ord_id".to_owned(),
                    parent_column_id: "tag_id".to_owned(),
                    mm_model_id: Some(mm_model_id.to_owned()),
                    mm_child_column_id: Some("ot_order".to_owned()),
                    mm_parent_column_id: Some("ot_tag".to_owned()),
                    belongs_to: false,
                }),
            ),
            column(
                "ord_custname",
                "CustomerName",
                "",
                ColumnKind::Lookup(LookupOptions {
                    relation_column_id: "ord_customer".to_owned(),
                    lookup_column_id: "cust_name".to_owned(),
                }),
            ),
            column(
                "ord_tagnames",
                "TagNames",
                "",
                ColumnKind::Lookup(LookupOptions {
                    relation_column_id: "ord_tags".to_owned(),
                    lookup_column_id: "tag_name".to_owned(),
                }),
            ),
            column(
                "ord_tagcount",
                "TagCount",
                "",
                ColumnKind::Links(LinksOptions {
                    relation_column_id: "ord_tags".to_owned(),
                }),
            ),
        ],
    };

    vec![customers, tags, orders_tags, orders]
}

fn fixture_store() -> StaticMetaStore {
    StaticMetaStore::new(fixture_models("orders_tags"), fixture_views())
}

fn fixture_views() -> Vec<View> {
    vec![View {
        id: "v_orders".to_owned(),
        model_id: "orders".to_owned(),
        shown_column_ids: vec![
            "ord_title".to_owned(),
            "ord_active".to_owned(),
            "ord_customer".to_owned(),
            "ord_tags".to_owned(),
            "ord_custname".to_owned(),
            "ord_tagcount".to_owned(),
        ],
        filters: vec![],
        sorts: vec![],
    }]
}

/// Records every statement it receives; serves canned data rows and a
/// canned (optionally delayed) count.
struct MockExecutor {
    calls: Mutex<Vec<(String, Vec<BindValue>)>>,
    data_rows: Vec<Row>,
    count: i64,
    count_delay: Option<Duration>,
}

impl MockExecutor {
    fn new(data_rows: Vec<Row>, count: i64) -> Self {
        Self {
            calls: Mutex::new(vec![]),
            data_rows,
            count,
            count_delay: None,
        }
    }

    fn with_count_delay(mut self, delay: Duration) -> Self {
        self.count_delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<(String, Vec<BindValue>)> {
        self.calls.lock().unwrap().clone()
    }

    fn data_calls(&self) -> Vec<(String, Vec<BindValue>)> {
        self.calls()
            .into_iter()
            .filter(|(sql, _)| !is_count_query(sql))
            .collect()
    }
}

fn is_count_query(sql: &str) -> bool {
    sql.contains("AS \"count\"")
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, sql: &str, params: &[BindValue]) -> Result<Vec<Row>, ExecuteError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.push((sql.to_owned(), params.to_vec()));
        }
        if is_count_query(sql) {
            if let Some(delay) = self.count_delay {
                tokio::time::sleep(delay).await;
            }
            let mut row = Row::new();
            row.insert("count".to_owned(), json!(self.count));
            return Ok(vec![row]);
        }
        Ok(self.data_rows.clone())
    }
}

fn order_row() -> Row {
    let mut row = Row::new();
    row.insert("ord_id".to_owned(), json!(1));
    row.insert("ord_title".to_owned(), json!("First order"));
    row
}

fn context<'a>(
    store: &'a StaticMetaStore,
    executor: &'a MockExecutor,
    cache: &'a CompiledQueryCache,
) -> QueryContext<'a> {
    QueryContext {
        meta: store,
        executor,
        cache,
        defaults: QueryDefaults::default(),
        strict: true,
    }
}

#[tokio::test]
async fn list_compiles_deterministically_and_replays_from_cache() {
    let store = fixture_store();
    let params = ListParams::default();

    // two independent compilations of the same table/view
    let executor_a = MockExecutor::new(vec![order_row()], 1);
    let cache_a = CompiledQueryCache::new();
    let ctx_a = context(&store, &executor_a, &cache_a);
    single_query_list(&ctx_a, "orders", Some("v_orders"), &params, None)
        .await
        .unwrap();

    let executor_b = MockExecutor::new(vec![order_row()], 1);
    let cache_b = CompiledQueryCache::new();
    let ctx_b = context(&store, &executor_b, &cache_b);
    single_query_list(&ctx_b, "orders", Some("v_orders"), &params, None)
        .await
        .unwrap();

    let sql_a = executor_a.data_calls()[0].0.clone();
    let sql_b = executor_b.data_calls()[0].0.clone();
    assert_eq!(sql_a, sql_b);
    assert!(sql_a.contains("LIMIT $1 OFFSET $2"), "sql: {sql_a}");

    // replay through the cache with a different window
    let response = single_query_list(
        &ctx_a,
        "orders",
        Some("v_orders"),
        &ListParams {
            limit: Some(10),
            offset: Some(20),
            ..ListParams::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(response.page_info.limit, 10);

    let data_calls = executor_a.data_calls();
    assert_eq!(data_calls.len(), 2);
    assert_eq!(data_calls[0].0, data_calls[1].0);
    assert_eq!(
        data_calls[1].1,
        vec![BindValue::Int(10), BindValue::Int(20)]
    );
}

#[tokio::test]
async fn ad_hoc_filters_always_recompile_with_inline_values() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let params = ListParams {
        where_clause: Some("(Active,eq,true)".to_owned()),
        ..ListParams::default()
    };
    single_query_list(&ctx, "orders", Some("v_orders"), &params, None)
        .await
        .unwrap();

    let (sql, bind) = executor.data_calls()[0].clone();
    assert!(sql.contains("\"orders\".\"active\" = TRUE"), "sql: {sql}");
    assert!(sql.contains("LIMIT 25 OFFSET 0"), "sql: {sql}");
    assert!(!sql.contains('$'), "sql: {sql}");
    assert!(bind.is_empty());
}

#[tokio::test]
async fn many_to_many_projects_json_array_with_empty_fallback() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    single_query_list(&ctx, "orders", Some("v_orders"), &ListParams::default(), None)
        .await
        .unwrap();

    let sql = executor.data_calls()[0].0.clone();
    assert!(sql.contains("LEFT OUTER JOIN LATERAL"), "sql: {sql}");
    assert!(sql.contains("\"orders_tags\""), "sql: {sql}");
    // plural relations aggregate to an array of objects, [] when empty
    assert!(
        sql.contains("coalesce(json_agg(json_build_object('tag_id'"),
        "sql: {sql}"
    );
    assert!(sql.contains("'[]'::json"), "sql: {sql}");
    // singular relations aggregate to a single object
    assert!(sql.contains("json_build_object('cust_id'"), "sql: {sql}");
    // the reverse-relation count is a correlated aggregate
    assert!(sql.contains("count("), "sql: {sql}");
}

#[tokio::test]
async fn nested_where_is_pushed_into_the_relation_subquery() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let mut nested = indexmap::IndexMap::new();
    nested.insert(
        "Tags".to_owned(),
        NestedParams {
            where_clause: Some("(Active,eq,true)".to_owned()),
            ..NestedParams::default()
        },
    );
    let params = ListParams {
        nested: Some(nested),
        ..ListParams::default()
    };
    single_query_list(&ctx, "orders", Some("v_orders"), &params, None)
        .await
        .unwrap();

    let sql = executor.data_calls()[0].0.clone();
    // the predicate lands on the related table's subquery, not the root
    assert!(sql.contains(".\"active\" = TRUE"), "sql: {sql}");
    assert!(!sql.contains("\"orders\".\"active\""), "sql: {sql}");
}

#[tokio::test]
async fn count_query_past_deadline_reports_unknown_total() {
    let store = fixture_store();
    let executor =
        MockExecutor::new(vec![order_row()], 7).with_count_delay(Duration::from_millis(200));
    let cache = CompiledQueryCache::new();
    let mut ctx = context(&store, &executor, &cache);
    ctx.defaults.count_timeout_ms = 25;

    let response = single_query_list(&ctx, "orders", Some("v_orders"), &ListParams::default(), None)
        .await
        .unwrap();

    assert_eq!(response.list.len(), 1);
    assert_eq!(response.page_info.total_rows, None);
    assert_eq!(response.page_info.is_last_page, None);
}

#[tokio::test]
async fn offset_beyond_total_returns_empty_page_with_true_total() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![], 5);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let params = ListParams {
        offset: Some(100),
        ..ListParams::default()
    };
    let response = single_query_list(&ctx, "orders", Some("v_orders"), &params, None)
        .await
        .unwrap();

    assert!(response.list.is_empty());
    assert_eq!(response.page_info.total_rows, Some(5));
    assert_eq!(response.page_info.is_last_page, Some(true));
    assert!(!response.page_info.is_first_page);
}

#[tokio::test]
async fn read_compiles_with_key_placeholder_and_replays() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let row = single_query_read(&ctx, "orders", Some("v_orders"), "42", &ReadParams::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get("ord_id"), Some(&json!(1)));

    single_query_read(&ctx, "orders", Some("v_orders"), "43", &ReadParams::default())
        .await
        .unwrap();

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    // both executions replay the same compiled text, binding only the key
    assert_eq!(calls[0].0, calls[1].0);
    assert!(calls[0].0.contains("$1"), "sql: {}", calls[0].0);
    assert_eq!(calls[0].1, vec![BindValue::Text("42".to_owned())]);
    assert_eq!(calls[1].1, vec![BindValue::Text("43".to_owned())]);
}

#[tokio::test]
async fn naive_timestamps_are_normalized_to_utc() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let params = ListParams {
        fields: Some("PlacedAt".to_owned()),
        ..ListParams::default()
    };
    single_query_list(&ctx, "orders", None, &params, None)
        .await
        .unwrap();

    let sql = executor.data_calls()[0].0.clone();
    assert!(
        sql.contains(
            "AT TIME ZONE current_setting('timezone') AT TIME ZONE 'UTC'), 'YYYY-MM-DD\"T\"HH24:MI:SS\"Z\"')"
        ),
        "sql: {sql}"
    );
}

#[tokio::test]
async fn lookup_through_plural_relation_aggregates_values() {
    let store = fixture_store();
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let params = ListParams {
        fields: Some("TagNames,CustomerName".to_owned()),
        ..ListParams::default()
    };
    single_query_list(&ctx, "orders", None, &params, None)
        .await
        .unwrap();

    let sql = executor.data_calls()[0].0.clone();
    // plural lookup: array of the looked-up values, [] when empty
    assert!(sql.contains("coalesce(json_agg("), "sql: {sql}");
    assert!(sql.contains("\"tag_name\""), "sql: {sql}");
    // singular lookup stays scalar: no aggregation around the customer name
    assert!(sql.contains("\"cust_name\" AS \"ord_custname\""), "sql: {sql}");
}

#[tokio::test]
async fn missing_join_table_projects_error_sentinel_instead_of_failing() {
    // the Tags relation points at a join table that does not exist
    let store = StaticMetaStore::new(fixture_models("missing_join_table"), fixture_views());
    let executor = MockExecutor::new(vec![order_row()], 1);
    let cache = CompiledQueryCache::new();
    let ctx = context(&store, &executor, &cache);

    let params = ListParams {
        fields: Some("Tags,Title".to_owned()),
        ..ListParams::default()
    };
    single_query_list(&ctx, "orders", None, &params, None)
        .await
        .unwrap();

    let sql = executor.data_calls()[0].0.clone();
    assert!(
        sql.contains("'ERR_MM_TABLE_NOT_FOUND' AS \"ord_tags\""),
        "sql: {sql}"
    );
    // the rest of the row still projects
    assert!(sql.contains("\"title\" AS \"ord_title\""), "sql: {sql}");
}
