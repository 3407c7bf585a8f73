mod cache;
mod config;
mod etl;
mod fetch;
mod rollup;
mod session;
mod storage;
#[cfg(test)]
mod testutil;
mod transform;

use crate::cache::ResponseCache;
use crate::config::ApiConfig;
use crate::etl::EtlService;
use crate::rollup::RollupService;
use log::info;
use std::sync::Arc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("crewsync", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    // 配置每次启动从环境读取，数据源在每次运行时再行解析
    let config = ApiConfig::from_env();
    let db = Arc::new(storage::establish_connection(&config.database_url).await?);
    let cache = Arc::new(ResponseCache::from_config(&config));
    let service = EtlService::new(db.clone(), config, cache);

    // 用法: crewsync            跑一次完整管道并打印聚合结果
    //       crewsync search <name>   只按姓名搜索成员
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 3 && args[1] == "search" {
        let results = service.search_members(&args[2]).await?;
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    let report = service.run().await?;
    info!(
        "运行报告: 抓取 {} 条，过滤 {} 条，补全 {} 条，入库 {}+{} 条，告警 {} 条",
        report.fetched,
        report.filtered_out,
        report.enriched,
        report.inserted,
        report.updated,
        report.warnings.len()
    );
    for warning in &report.warnings {
        info!("⚠ [{}] {}: {}", warning.record_key, warning.field, warning.message);
    }

    let rollup = RollupService::team_totals(db.as_ref()).await?;
    println!("id\tteam_total");
    for total in &rollup.totals {
        println!("{}\t{:.2}", total.id, total.total);
    }
    if !rollup.cycles.is_empty() {
        eprintln!(
            "检测到 {} 组上级闭环，相关成员未计入合计",
            rollup.cycles.len()
        );
    }

    Ok(())
}
