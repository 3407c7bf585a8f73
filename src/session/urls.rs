use crate::config::{ResolvedSource, SourceKind};

/// 生产环境的路由挂在 /api 前缀下，沙盒环境的 base URL 已自带路径前缀
fn route_prefix(source: &ResolvedSource) -> &'static str {
    match source.kind {
        SourceKind::Production => "/api",
        SourceKind::Sandbox => "",
    }
}

/// 花名册列表（分页首页）
pub fn url_roster(source: &ResolvedSource) -> String {
    format!("{}{}/roster/", source.base_url, route_prefix(source))
}

/// 按姓名搜索成员
pub fn url_roster_search(source: &ResolvedSource, name: &str) -> String {
    format!(
        "{}{}/roster/?search={}",
        source.base_url,
        route_prefix(source),
        encode_query(name)
    )
}

/// 成员详情
pub fn url_roster_member(source: &ResolvedSource, id: i64) -> String {
    format!("{}{}/roster/{}/", source.base_url, route_prefix(source), id)
}

/// 按名称搜索部门
pub fn url_divisions_search(source: &ResolvedSource, name: &str) -> String {
    format!(
        "{}{}/divisions/?search={}",
        source.base_url,
        route_prefix(source),
        encode_query(name)
    )
}

fn encode_query(value: &str) -> String {
    value.replace(' ', "%20").replace('+', "%2B")
}
