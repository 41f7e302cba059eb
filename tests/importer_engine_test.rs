// ==========================================
// 导入引擎端到端测试（CSV → SQLite）
// ==========================================


use std::sync::Arc;
use tabular_importer::importer::source::open_source;
use tabular_importer::{
    ImportEngine, ImportOptions, ImportReporter, ImportTask, RecordStoreAdapter, RowStatus,
    SqliteRecordStore, SqliteReportRepo, TaskStatus,
};
use test_helpers::{in_memory_conn, init_logging, product_mapping, write_csv};

const MIXED_CSV: &str = "\
sku,name,price,stock
a1,螺栓,1.50,100
a2,螺母,坏数据,50
a3,,2.00,10
";

fn engine(store: Arc<SqliteRecordStore>) -> ImportEngine {
    ImportEngine::new(product_mapping(), store, ImportOptions::default())
}

#[tokio::test]
async fn test_mixed_csv_import_end_to_end() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "products.csv", MIXED_CSV);

    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());
    let task = ImportTask::new("product", path.to_str(), Some("tester"));
    let task_id = task.task_id.clone();
    let mut reporter = ImportReporter::new(repo.clone(), task, 5);

    let source = open_source(&path).unwrap();
    let result = engine(store.clone())
        .import_data(source, Some(&mut reporter), None)
        .await
        .unwrap();

    // 行分片: 1 全成功 + 1 部分成功 + 1 失败
    assert!(result.check_invariant());
    assert_eq!(result.total, 3);
    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.partial_success_rows, vec![2]);
    assert_eq!(result.created_ids.len(), 2);

    // 部分成功行：price 未落库，name 落库
    let partial = result.field_level_results.get(&2).unwrap();
    assert_eq!(partial.get("price"), Some(&false));
    assert_eq!(partial.get("name"), Some(&true));

    // 失败行不落库
    assert_eq!(store.count("product").await.unwrap(), 2);

    // 报告持久化
    let summary = reporter.complete(TaskStatus::Partial).await.unwrap();
    assert_eq!(summary.created_count, 2);
    assert_eq!(summary.failed_rows, 1);

    let report = ImportReporter::fetch_report(repo.as_ref(), &task_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.details.len(), 3);
    assert_eq!(report.details[0].status, RowStatus::Created);
    assert_eq!(report.details[1].status, RowStatus::Partial);
    assert_eq!(report.details[2].status, RowStatus::Failed);
    assert!(report.details[2]
        .fields_failed
        .contains_key("name"));
}

#[tokio::test]
async fn test_rerun_is_idempotent_updates_not_creates() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let csv = "\
sku,name,price
a1,螺栓,1.50
a2,螺母,0.80
";
    let path = write_csv(dir.path(), "products.csv", csv);
    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());

    let first = engine(store.clone())
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap();
    assert_eq!(first.created_ids.len(), 2);

    // 同一文件重跑：唯一键命中，全部走更新
    let second = engine(store.clone())
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap();
    assert_eq!(second.created_ids.len(), 0);
    assert_eq!(second.updated_ids.len(), 2);
    assert_eq!(store.count("product").await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_disabled_skips_existing_rows() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "products.csv", "sku,name\na1,螺栓\n");
    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());

    engine(store.clone())
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap();

    let no_update = ImportEngine::new(
        product_mapping(),
        store.clone(),
        ImportOptions {
            update_existing: false,
            ..Default::default()
        },
    );
    let result = no_update
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(result.skipped_rows, vec![1]);
    assert_eq!(store.count("product").await.unwrap(), 1);
}

#[tokio::test]
async fn test_alias_headers_and_locale_values() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    // 别名表头 + 逗号小数分隔符 + 本地化布尔词
    let csv = "\
sku,Ürün Adı,单价,is_active
a1,Cıvata,\"150,75\",evet
";
    let path = write_csv(dir.path(), "locale.csv", csv);
    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());

    let result = engine(store.clone())
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert!(result.partial_success_rows.is_empty());

    let dump: serde_json::Value =
        serde_json::from_str(&store.dump_all("product").await.unwrap()).unwrap();
    let fields = &dump[0]["fields"];
    assert_eq!(fields["price"]["value"], 150.75);
    assert_eq!(fields["is_active"]["value"], true);
    assert_eq!(fields["name"]["value"], "Cıvata");
}

#[tokio::test]
async fn test_missing_required_column_fails_before_any_row() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "bad.csv", "price,stock\n1.5,10\n");
    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());

    let err = engine(store.clone())
        .import_data(open_source(&path).unwrap(), None, None)
        .await
        .unwrap_err();

    match err {
        tabular_importer::ImportError::MissingRequiredColumns { fields } => {
            assert_eq!(fields, vec!["name".to_string(), "sku".to_string()]);
        }
        other => panic!("期望 MissingRequiredColumns，实际 {:?}", other),
    }
    assert_eq!(store.count("product").await.unwrap(), 0);
}
