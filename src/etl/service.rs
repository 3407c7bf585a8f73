use crate::cache::ResponseCache;
use crate::config::{ApiConfig, SourceKind};
use crate::etl::model::{EtlError, EtlReport};
use crate::fetch::model::{FetchRequest, Record};
use crate::fetch::FetchService;
use crate::session::{RosterPage, RosterSession};
use crate::storage::repository::CrewRepository;
use crate::transform::{probe, probe_id, TransformMode, Transformer};
use chrono::Local;
use log::{info, warn};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 生产模式下过滤花名册用的现役部门
const ACTIVE_DIVISION: &str = "Expeditionary";

/// 管道编排：解析数据源 -> 抓取 -> 过滤 -> 补全 -> 转换 -> 加载
pub struct EtlService {
    db: Arc<DatabaseConnection>,
    config: ApiConfig,
    cache: Arc<ResponseCache>,
}

impl EtlService {
    pub fn new(db: Arc<DatabaseConnection>, config: ApiConfig, cache: Arc<ResponseCache>) -> Self {
        Self { db, config, cache }
    }

    /// 运行一次完整的抽取-转换-加载流程
    pub async fn run(&self) -> Result<EtlReport, EtlError> {
        // 数据源每次运行重新解析，配置变更立即生效
        let source = self.config.resolve()?;
        info!("开始 ETL，数据源: {} [{}]", source.kind.as_str(), source.base_url);

        let session = Arc::new(RosterSession::new(source.clone()));
        let fetcher = FetchService::new(session, self.cache.clone(), self.config.fetch_concurrency);

        // 1. 分页抓取全部花名册
        let mut items = fetcher.fetch_roster_paginated().await?;
        let fetched = items.len();

        // 2. 原始报文本地备份，失败不影响管道
        self.persist_backup(&items, "roster_data");

        // 3. 生产模式按现役部门过滤，沙盒环境照单全收
        let mut filtered_out = 0usize;
        if source.kind == SourceKind::Production {
            match self.resolve_active_division(&fetcher).await {
                Some(division) => {
                    let before = items.len();
                    items.retain(|rec| {
                        matches!(
                            probe(&rec.body, &["division", "Division"]).and_then(|v| v.as_str()),
                            Some(d) if d.eq_ignore_ascii_case(&division)
                        )
                    });
                    filtered_out = before - items.len();
                    info!("部门过滤 [{}]: {} -> {} 条", division, before, items.len());
                }
                None => warn!("未能解析现役部门，跳过过滤"),
            }
        } else {
            info!("沙盒环境：跳过部门过滤");
        }

        // 4. 缺薪资字段的摘要记录并发补全详情，失败的保留摘要继续
        let detail_requests: Vec<FetchRequest> = items
            .iter()
            .filter(|rec| probe(&rec.body, &["salary", "Salary"]).is_none())
            .filter_map(|rec| probe_id(&rec.body))
            .map(|id| FetchRequest::MemberDetail { id })
            .collect();

        let mut enriched = 0usize;
        let mut enrich_failures = 0usize;
        if !detail_requests.is_empty() {
            info!("需要补全详情的记录: {} 条", detail_requests.len());
            let report = fetcher.fetch_batch(detail_requests).await;

            let mut details: HashMap<i64, Record> = HashMap::new();
            for rec in report.records() {
                if let Some(id) = probe_id(&rec.body) {
                    details.insert(id, rec.clone());
                }
            }
            for item in items.iter_mut() {
                if let Some(detail) = probe_id(&item.body).and_then(|id| details.remove(&id)) {
                    *item = detail;
                    enriched += 1;
                }
            }
            for (request, err) in report.failures() {
                warn!("详情补全失败 {:?}: {}", request, err);
                enrich_failures += 1;
            }
        }

        // 5. 转换
        let mode = if self.config.wookiee_mode {
            TransformMode::Wookiee
        } else {
            TransformMode::Normalize
        };
        let transformer = Transformer::new(mode);
        let (records, warnings) = transformer.transform_batch(&items);

        // 6. 单事务加载
        let stats = CrewRepository::upsert_batch(&self.db, &records).await?;

        info!(
            "✓ ETL 完成: 抓取 {} 条，过滤 {} 条，补全 {} 条，入库 {}+{} 条，告警 {} 条",
            fetched,
            filtered_out,
            enriched,
            stats.inserted,
            stats.updated,
            warnings.len()
        );

        Ok(EtlReport {
            source: source.kind,
            fetched,
            filtered_out,
            enriched,
            enrich_failures,
            inserted: stats.inserted,
            updated: stats.updated,
            warnings,
        })
    }

    /// 按姓名搜索成员。查询走缓存，结果不入库。
    pub async fn search_members(&self, name: &str) -> Result<Vec<Value>, EtlError> {
        let source = self.config.resolve()?;
        let session = Arc::new(RosterSession::new(source));
        let fetcher = FetchService::new(session, self.cache.clone(), self.config.fetch_concurrency);

        let outcome = fetcher
            .execute(&FetchRequest::SearchMember {
                name: name.to_string(),
            })
            .await;
        let record = outcome.result?;
        Ok(RosterPage::from_value(&record.body).items)
    }

    /// 解析现役部门名，取搜索结果的第一条。失败只告警不中断。
    async fn resolve_active_division(&self, fetcher: &FetchService) -> Option<String> {
        let outcome = fetcher
            .execute(&FetchRequest::SearchDivision {
                name: ACTIVE_DIVISION.to_string(),
            })
            .await;
        match outcome.result {
            Ok(record) => RosterPage::from_value(&record.body)
                .items
                .first()
                .and_then(|item| probe(item, &["name", "Name"]))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            Err(e) => {
                warn!("现役部门查询失败: {}", e);
                None
            }
        }
    }

    /// 把整次抓取的原始报文写入本地备份文件，失败仅记录日志
    fn persist_backup(&self, items: &[Record], prefix: &str) {
        let dir = std::path::Path::new(&self.config.backup_dir);
        let payload = serde_json::json!({
            "results": items.iter().map(|r| r.body.clone()).collect::<Vec<_>>()
        });
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.json", prefix, timestamp));

        let written = std::fs::create_dir_all(dir).and_then(|_| {
            std::fs::write(&path, serde_json::to_string_pretty(&payload).unwrap_or_default())
        });
        match written {
            Ok(_) => info!("备份已写入 {}", path.display()),
            Err(e) => warn!("备份写入失败: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollup::RollupService;
    use crate::storage::establish_connection;
    use crate::testutil::spawn_routes;
    use std::time::Duration;

    fn test_backup_dir() -> String {
        std::env::temp_dir()
            .join(format!("crewsync-test-backups-{}", std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    async fn make_etl(config: ApiConfig) -> (EtlService, Arc<DatabaseConnection>) {
        let db = Arc::new(establish_connection("sqlite::memory:").await.unwrap());
        let cache = Arc::new(ResponseCache::new(None, Duration::from_secs(60)));
        (EtlService::new(db.clone(), config, cache), db)
    }

    #[tokio::test]
    async fn sandbox_pipeline_loads_and_aggregates() {
        let stub = spawn_routes(
            vec![
                (
                    "page=2".to_string(),
                    200,
                    r#"{"results": [{"id": 3, "manager_id": 2, "salary": "3", "name": "Echo"}], "next": null}"#.to_string(),
                ),
                (
                    "/roster/".to_string(),
                    200,
                    r#"{"results": [
                        {"id": 1, "manager_id": null, "salary": 10, "name": "Cody"},
                        {"id": 2, "manager_id": 1, "salary": 5, "name": "Rex"}
                    ], "next": "{base}/roster/?page=2"}"#.to_string(),
                ),
            ],
            Duration::ZERO,
        )
        .await;

        let config = ApiConfig {
            dev_base_url: stub.base.clone(),
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, db) = make_etl(config).await;

        let report = etl.run().await.unwrap();
        assert_eq!(report.source, SourceKind::Sandbox);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.filtered_out, 0);
        assert_eq!(report.inserted, 3);
        assert!(report.warnings.is_empty());

        let rollup = RollupService::team_totals(&db).await.unwrap();
        let totals: HashMap<i64, f64> = rollup.totals.iter().map(|t| (t.id, t.total)).collect();
        assert_eq!(totals[&1], 18.0);
        assert_eq!(totals[&2], 8.0);
        assert_eq!(totals[&3], 3.0);
    }

    #[tokio::test]
    async fn production_pipeline_filters_by_active_division() {
        let stub = spawn_routes(
            vec![
                (
                    "/api/divisions/".to_string(),
                    200,
                    r#"{"results": [{"name": "Recon"}]}"#.to_string(),
                ),
                (
                    "/api/roster/".to_string(),
                    200,
                    r#"{"employees": [
                        {"EmployeeID": "1", "Salary": "100", "Name": "Cody", "Division": "Recon"},
                        {"EmployeeID": "2", "Salary": "50", "Name": "Bly", "Division": "Logistics"}
                    ]}"#.to_string(),
                ),
            ],
            Duration::ZERO,
        )
        .await;

        let config = ApiConfig {
            use_prod: true,
            api_token: Some("token".to_string()),
            prod_base_url: stub.base.clone(),
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, db) = make_etl(config).await;

        let report = etl.run().await.unwrap();
        assert_eq!(report.source, SourceKind::Production);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.filtered_out, 1);
        assert_eq!(report.inserted, 1);

        let rows = CrewRepository::load_all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].salary, 100.0);
        assert_eq!(rows[0].source, "prod");
    }

    #[tokio::test]
    async fn summaries_without_salary_get_detail_enrichment() {
        let stub = spawn_routes(
            vec![
                (
                    "/roster/1/".to_string(),
                    200,
                    r#"{"id": 1, "salary": 100, "name": "Cody", "rank": "Commander"}"#.to_string(),
                ),
                (
                    "/roster/".to_string(),
                    200,
                    r#"{"results": [{"id": 1, "name": "Cody"}], "next": null}"#.to_string(),
                ),
            ],
            Duration::ZERO,
        )
        .await;

        let config = ApiConfig {
            dev_base_url: stub.base.clone(),
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, db) = make_etl(config).await;

        let report = etl.run().await.unwrap();
        assert_eq!(report.enriched, 1);
        assert_eq!(report.enrich_failures, 0);
        assert!(report.warnings.is_empty());

        let rows = CrewRepository::load_all(&db).await.unwrap();
        assert_eq!(rows[0].salary, 100.0);
        assert_eq!(rows[0].rank, "Commander");
    }

    #[tokio::test]
    async fn failed_enrichment_keeps_summary_with_warning() {
        // 详情端点 404，摘要记录仍然入库，薪资按缺失处理
        let stub = spawn_routes(
            vec![(
                "/roster/".to_string(),
                200,
                r#"{"results": [{"id": 1, "name": "Cody"}], "next": null}"#.to_string(),
            )],
            Duration::ZERO,
        )
        .await;

        let config = ApiConfig {
            dev_base_url: stub.base.clone(),
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, db) = make_etl(config).await;

        let report = etl.run().await.unwrap();
        assert_eq!(report.enriched, 0);
        assert_eq!(report.enrich_failures, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings.len(), 1);

        let rows = CrewRepository::load_all(&db).await.unwrap();
        assert_eq!(rows[0].salary, 0.0);
    }

    #[tokio::test]
    async fn search_members_returns_raw_items() {
        let stub = spawn_routes(
            vec![(
                "search=Grievous".to_string(),
                200,
                r#"{"results": [{"id": 44, "name": "Grievous"}]}"#.to_string(),
            )],
            Duration::ZERO,
        )
        .await;

        let config = ApiConfig {
            dev_base_url: stub.base.clone(),
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, _db) = make_etl(config).await;

        let items = etl.search_members("Grievous").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Grievous");
    }

    #[tokio::test]
    async fn production_without_token_fails_before_any_fetch() {
        let config = ApiConfig {
            use_prod: true,
            api_token: None,
            backup_dir: test_backup_dir(),
            ..Default::default()
        };
        let (etl, _db) = make_etl(config).await;

        let err = etl.run().await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
