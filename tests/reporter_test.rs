// ==========================================
// 导入报告持久化测试（SQLite）
// ==========================================


use std::sync::Arc;
use tabular_importer::importer::source::open_source;
use tabular_importer::{
    ImportEngine, ImportOptions, ImportReportRepo, ImportReporter, ImportTask, SqliteRecordStore,
    SqliteReportRepo, TaskStatus,
};
use test_helpers::{in_memory_conn, init_logging, product_mapping, write_csv};

async fn run_import(csv: &str, repo: Arc<SqliteReportRepo>) -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", csv);
    let store = Arc::new(SqliteRecordStore::new(in_memory_conn()).unwrap());
    let engine = ImportEngine::new(product_mapping(), store, ImportOptions::default());

    let task = ImportTask::new("product", path.to_str(), Some("tester"));
    let task_id = task.task_id.clone();
    let mut reporter = ImportReporter::new(repo, task, 5);

    let result = engine
        .import_data(open_source(&path).unwrap(), Some(&mut reporter), None)
        .await
        .unwrap();
    reporter
        .complete(ImportEngine::final_status(&result))
        .await
        .unwrap();
    task_id
}

#[tokio::test]
async fn test_field_stats_and_top_errors_persisted() {
    init_logging();
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());

    // price 在 4 行中失败 3 次，stock 失败 1 次
    let csv = "\
sku,name,price,stock
a1,产品1,坏价,10
a2,产品2,坏价,20
a3,产品3,坏价,x
a4,产品4,4.50,40
";
    let task_id = run_import(csv, repo.clone()).await;

    let summary = repo.get_summary(&task_id).await.unwrap().unwrap();
    assert_eq!(summary.partial_rows, 3);
    assert_eq!(summary.success_rows, 1);
    assert_eq!(summary.created_count, 4);

    let price = summary.field_stats.get("price").unwrap();
    assert_eq!(price.failed, 3);
    assert_eq!(price.success, 1);
    assert_eq!(price.rate, 25.0);

    // Top 错误按出现次数降序
    assert_eq!(summary.top_errors[0].count, 3);
    assert!(summary.top_errors[0].message.contains("无法解析为小数"));
}

#[tokio::test]
async fn test_task_lifecycle_timestamps() {
    init_logging();
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());
    let task_id = run_import("sku,name\na1,产品\n", repo.clone()).await;

    let task = repo.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.record_type, "product");
    assert_eq!(task.initiated_by.as_deref(), Some("tester"));
    assert!(task.started_at.is_some());
    assert!(task.completed_at.is_some());
    assert!(task.started_at.unwrap() >= task.created_at);
}

#[tokio::test]
async fn test_recent_tasks_ordering_and_limit() {
    init_logging();
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());
    for _ in 0..3 {
        run_import("sku,name\na1,产品\n", repo.clone()).await;
    }

    let recent = repo.list_recent_tasks(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].created_at >= recent[1].created_at);
}

#[tokio::test]
async fn test_zero_row_file_completes_cleanly() {
    init_logging();
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());
    let task_id = run_import("sku,name\n", repo.clone()).await;

    let task = repo.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let summary = repo.get_summary(&task_id).await.unwrap().unwrap();
    assert_eq!(summary.total_rows, 0);
    assert!(summary.top_errors.is_empty());
    assert!(summary.field_stats.is_empty());

    let details = repo.list_row_details(&task_id).await.unwrap();
    assert!(details.is_empty());
}

#[tokio::test]
async fn test_delete_task_cascades_report_data() {
    init_logging();
    let repo = Arc::new(SqliteReportRepo::new(in_memory_conn()).unwrap());
    let task_id = run_import("sku,name\na1,产品\n", repo.clone()).await;

    repo.delete_task(&task_id).await.unwrap();
    assert!(repo.get_task(&task_id).await.unwrap().is_none());
    assert!(repo.get_summary(&task_id).await.unwrap().is_none());
    assert!(repo.list_row_details(&task_id).await.unwrap().is_empty());
}
